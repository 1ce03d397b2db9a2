use crate::query::types::QuerySpec;

/// `{dataset}-{operation}-{parameters...}`. `-` and `\` inside a component are
/// backslash-escaped so keys of different datasets or operations never collide.
pub fn cache_key(dataset: &str, operation: &str, parameters: &[&str]) -> String {
    let mut key = escape(dataset);
    key.push('-');
    key.push_str(&escape(operation));
    for parameter in parameters {
        key.push('-');
        key.push_str(&escape(parameter));
    }
    key
}

fn escape(component: &str) -> String {
    component.replace('\\', "\\\\").replace('-', "\\-")
}

pub fn config_key(dataset: &str) -> String {
    cache_key(dataset, "config", &[])
}

pub fn metadata_key(dataset: &str) -> String {
    cache_key(dataset, "metadata", &[])
}

pub fn read_key(dataset: &str, id: &str) -> String {
    cache_key(dataset, "read", &[id])
}

pub fn index_key(dataset: &str) -> String {
    cache_key(dataset, "index", &[])
}

pub fn tag_key(dataset: &str, tag: &str) -> String {
    cache_key(dataset, "tag", &[tag])
}

/// Options are part of the key: the same page with another page size or
/// filter is a different result.
pub fn query_key(dataset: &str, spec: &QuerySpec) -> String {
    let page = spec.resolved_page().to_string();
    let options = serde_json::to_string(&spec.options).unwrap_or_default();
    cache_key(
        dataset,
        "query",
        &[page.as_str(), spec.resolved_tag(), spec.query_type.as_str(), options.as_str()],
    )
}

pub fn count_key(dataset: &str, spec: &QuerySpec) -> String {
    let options = serde_json::to_string(&spec.options).unwrap_or_default();
    cache_key(
        dataset,
        "count",
        &[spec.resolved_tag(), spec.query_type.as_str(), options.as_str()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_is_readable() {
        assert_eq!(read_key("blog", "post1"), "blog-read-post1");
        assert_eq!(
            query_key("blog", &QuerySpec::pages().page(2).tag("rust")),
            "blog-query-2-rust-PAGES-{}"
        );
    }

    #[test]
    fn dashes_cannot_forge_other_keys() {
        assert_ne!(read_key("a-read", "x"), read_key("a", "read-x"));
        assert_ne!(tag_key("blog", "x-y"), cache_key("blog", "tag", &["x", "y"]));
        assert_ne!(cache_key("d", "op", &["x-", "y"]), cache_key("d", "op", &["x", "-y"]));
        assert_eq!(read_key("my-blog", "p"), "my\\-blog-read-p");
    }
}
