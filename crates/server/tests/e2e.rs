use std::net::SocketAddr;

use configs::{AppConfig, StoreBackend};
use reqwest::StatusCode as HttpStatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use server::startup;

struct TestApp {
    base_url: String,
}

async fn start_server() -> anyhow::Result<TestApp> {
    let mut cfg = AppConfig::default();
    cfg.store.backend = StoreBackend::Memory;
    cfg.normalize_and_validate_with(|_| None)?;

    let app = startup::build_app(&cfg)?;
    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    let base_url = format!("http://{}:{}", addr.ip(), addr.port());

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await { eprintln!("server error: {}", e); }
    });

    Ok(TestApp { base_url })
}

#[tokio::test]
async fn e2e_public_health() -> anyhow::Result<()> {
    let app = start_server().await?;
    let res = reqwest::get(format!("{}/health", app.base_url)).await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let body = res.json::<Value>().await?;
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn e2e_story_lifecycle() -> anyhow::Result<()> {
    let app = start_server().await?;
    let c = reqwest::Client::new();

    // Create
    let res = c.post(format!("{}/api/stories", app.base_url))
        .json(&json!({"title": "Brave Bunny", "prompt": "a brave bunny", "age": "3-5"}))
        .send().await?;
    assert_eq!(res.status(), HttpStatusCode::CREATED);
    let created = res.json::<Value>().await?;
    let id = created["id"].as_str().expect("id").to_string();
    let token = created["deletionToken"].as_str().expect("token").to_string();

    // Pipeline progress
    let content = json!({"title": "Brave Bunny", "pages": [{"text": "Once upon a time...", "imagePrompt": "a bunny"}]});
    let res = c.patch(format!("{}/api/stories/{}", app.base_url, id))
        .header("x-deletion-token", &token)
        .json(&json!({"status": "generating_images", "storyContent": content}))
        .send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);

    // Read back
    let res = c.get(format!("{}/api/stories/{}", app.base_url, id)).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let story = res.json::<Value>().await?;
    assert_eq!(story["status"], "generating_images");
    let parsed: Value = serde_json::from_str(story["storyContent"].as_str().expect("text"))?;
    assert_eq!(parsed, content);

    // Listed
    let listed = c.get(format!("{}/api/stories", app.base_url)).send().await?.json::<Value>().await?;
    assert!(listed.as_array().expect("array").iter().any(|s| s["id"] == id.as_str()));

    // Delete
    let res = c.delete(format!("{}/api/stories/{}", app.base_url, id))
        .header("x-deletion-token", &token)
        .send().await?;
    assert_eq!(res.status(), HttpStatusCode::NO_CONTENT);
    let res = c.get(format!("{}/api/stories/{}", app.base_url, id)).send().await?;
    assert_eq!(res.status(), HttpStatusCode::NOT_FOUND);
    Ok(())
}
