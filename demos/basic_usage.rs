/// Polydex walkthrough
///
/// Demonstrates the engine surface end to end:
/// - Dataset creation and configuration
/// - Tagged inserts and upserts
/// - PAGES / RANDOM / SEARCH / CUSTOM queries
/// - Removal, index snapshots and rebuilds
///
/// Run with `RUST_LOG=polydex=debug` to see the engine's logs.

use polydex::{open_backend, CacheConfig, EngineConfig, InsertRequest, Poly, QuerySpec};
use serde_json::json;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("\n╔═══════════════════════════════════════════════╗");
    println!("║        Polydex - Tagged Document Demo         ║");
    println!("╚═══════════════════════════════════════════════╝\n");

    // Step 1: Open a cached in-memory engine
    println!("Step 1: Opening engine...");
    let config = EngineConfig::memory().with_cache(CacheConfig::default());
    let engine = open_backend(&config)?;
    let blog_config = engine.create("blog")?;
    println!("  blog configured: {:?}\n", blog_config.data);

    // Step 2: INSERT - tagged documents
    println!("Step 2: INSERT - Adding posts...");
    let posts = [
        ("p1", "Ownership in Rust", "rust"),
        ("p2", "Goroutines explained", "go"),
        ("p3", "Lifetimes without tears", "rust"),
        ("p4", "Comptime tricks", "zig"),
        ("p5", "Async Rust in practice", "rust"),
    ];
    let requests = posts
        .iter()
        .map(|(id, title, lang)| {
            InsertRequest::new(Poly::new(*id).with("title", *title).with("lang", *lang)).tag(*lang)
        })
        .collect();
    let written = engine.insert("blog", requests)?;
    println!("  Inserted {} posts\n", written.len());

    // Step 3: QUERY - the four query types
    println!("Step 3: QUERY...");
    let newest = engine.query("blog", &QuerySpec::pages().item_per_page(3))?;
    println!("  newest 3:        {:?}", newest.ids());

    let rust = engine.query("blog", &QuerySpec::pages().tag("rust"))?;
    println!("  tag rust:        {:?}", rust.ids());

    let random = engine.query("blog", &QuerySpec::random(2))?;
    println!("  random 2:        {:?}", random.ids());

    let search = engine.query("blog", &QuerySpec::search("rust async"))?;
    println!("  search 'rust async': {:?}", search.ids());

    let custom = engine.query("blog", &QuerySpec::custom(json!({ "lang": { "$in": ["go", "zig"] } })))?;
    println!("  custom lang in (go, zig): {:?}\n", custom.ids());

    // Step 4: UPDATE - move a post to another tag
    println!("Step 4: UPDATE - retagging p2...");
    engine.update("blog", vec![InsertRequest::new(Poly::new("p2").with("title", "Goroutines, revisited")).tag("concurrency")])?;
    let p2 = engine.read("blog", &["p2".to_string()])?;
    if let Some(post) = p2.get("p2") {
        println!("  p2 tags: {:?}\n", post.tags());
    }

    // Step 5: DELETE
    println!("Step 5: DELETE - removing p4...");
    let removed = engine.remove("blog", &["p4".to_string(), "missing".to_string()])?;
    println!("  removed: {:?}\n", removed.ids());

    // Step 6: INDEX - counts and rebuild
    println!("Step 6: INDEX...");
    let report = engine.recalculate("blog")?;
    println!("  rebuilt: {} documents, {} tags, clean = {}", report.documents, report.tags, report.is_clean());
    for (tag, entry) in &engine.index("blog")?.data {
        println!("  {:<12} {}", tag, entry["count"]);
    }

    engine.close()?;
    println!("\nDone!");
    Ok(())
}
