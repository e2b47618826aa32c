// tests/live_providers.rs
//
// Live providers and language-model clients against local stand-in servers:
// an axum app playing the upstream, or a listener that accepts connections
// and never answers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use narrative_radar::explain::{Enricher, TemplateExplainer};
use narrative_radar::llm::ChatClient;
use narrative_radar::sources::{
    collect_all, CollectionWindow, GithubProvider, MockFeed, RssMentionsProvider, SignalSource,
    SolanaRpcProvider,
};
use narrative_radar::{Narrative, Pipeline, PipelineConfig, RunContext, SourceType};

const SHORT: Duration = Duration::from_millis(300);

fn window() -> CollectionWindow {
    CollectionWindow::new(Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap(), 14)
}

/// Accepts connections and never writes a byte.
async fn silent_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((sock, _)) = listener.accept().await {
            held.push(sock);
        }
    });
    format!("http://{addr}")
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn collect_bounded(sources: &[SignalSource]) -> Vec<narrative_radar::Signal> {
    tokio::time::timeout(Duration::from_secs(10), collect_all(sources, &window()))
        .await
        .expect("collection returns once requests time out")
}

#[tokio::test]
async fn unresponsive_feed_falls_back_to_mock_social() {
    let base = silent_endpoint().await;
    let rss = RssMentionsProvider::from_urls(vec![format!("{base}/rss.xml")], SHORT).unwrap();
    let out = collect_bounded(&[SignalSource::Live(Box::new(rss))]).await;
    assert_eq!(out, MockFeed::Social.generate(&window()));
}

#[tokio::test]
async fn unresponsive_github_falls_back_to_mock_development() {
    let base = silent_endpoint().await;
    let gh = GithubProvider::new(vec!["coral-xyz/anchor".into()], "t".into(), SHORT)
        .unwrap()
        .with_api_base(base);
    let out = collect_bounded(&[SignalSource::Live(Box::new(gh))]).await;
    assert_eq!(out, MockFeed::Development.generate(&window()));
}

#[tokio::test]
async fn unresponsive_rpc_falls_back_to_mock_onchain() {
    let base = silent_endpoint().await;
    let rpc = SolanaRpcProvider::new(base, SHORT).unwrap();
    let out = collect_bounded(&[SignalSource::Live(Box::new(rpc))]).await;
    assert_eq!(out, MockFeed::Onchain.generate(&window()));
}

// ---- GitHub ----

fn link_last(page: u32) -> String {
    format!(
        r#"<https://api.github.com/x?per_page=1&page=2>; rel="next", <https://api.github.com/x?per_page=1&page={page}>; rel="last""#
    )
}

async fn fake_github() -> String {
    async fn repo(Path((owner, name)): Path<(String, String)>) -> impl IntoResponse {
        if owner == "gone" {
            return StatusCode::NOT_FOUND.into_response();
        }
        Json(json!({
            "full_name": format!("{owner}/{name}"),
            "stargazers_count": 4200,
            "forks_count": 1300
        }))
        .into_response()
    }

    fn listing(q: &HashMap<String, String>, last: Option<u32>) -> axum::response::Response {
        if q.get("per_page").map(String::as_str) != Some("1") {
            return StatusCode::BAD_REQUEST.into_response();
        }
        match last {
            Some(page) => ([(header::LINK, link_last(page))], Json(json!([{}]))).into_response(),
            None => Json(json!([{}])).into_response(),
        }
    }

    let app = Router::new()
        .route("/repos/{owner}/{repo}", get(repo))
        .route(
            "/repos/{owner}/{repo}/commits",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                if !q.contains_key("since") || !q.contains_key("until") {
                    return StatusCode::BAD_REQUEST.into_response();
                }
                listing(&q, Some(84))
            }),
        )
        .route(
            "/repos/{owner}/{repo}/pulls",
            get(|Query(q): Query<HashMap<String, String>>| async move { listing(&q, None) }),
        )
        .route(
            "/repos/{owner}/{repo}/issues",
            get(|Query(q): Query<HashMap<String, String>>| async move { listing(&q, Some(280)) }),
        );
    serve(app).await
}

#[tokio::test]
async fn github_counts_come_from_link_headers() {
    let base = fake_github().await;
    let gh = GithubProvider::new(
        vec!["coral-xyz/anchor".into(), "gone/repo".into()],
        "t".into(),
        Duration::from_secs(5),
    )
    .unwrap()
    .with_api_base(base);

    let out = collect_bounded(&[SignalSource::Live(Box::new(gh))]).await;
    // the missing repo is skipped, the other one still reports
    assert_eq!(out.len(), 14);
    let s = &out[0];
    assert_eq!(s.source_type, SourceType::Development);
    assert_eq!(s.metadata["commits"], 84);
    assert_eq!(s.metadata["prs"], 1);
    assert_eq!(s.metadata["issues"], 280);
    // 84 + 1 / 14 + 280 / 14
    assert!(out.iter().all(|s| s.value == 104.0));
    assert_eq!(s.category(), Some("infrastructure"));
}

// ---- Solana RPC ----

async fn fake_rpc(fail: bool) -> String {
    let app = Router::new().route(
        "/",
        post(move |Json(req): Json<Value>| async move {
            if fail {
                return Json(json!({"jsonrpc": "2.0", "id": 1,
                    "error": {"code": -32005, "message": "node is behind"}}));
            }
            let result = match req["method"].as_str() {
                Some("getTransactionCount") => json!(5_000_000),
                Some("getProgramAccounts") if req["params"][1]["filters"][0]["dataSize"] == 36 => {
                    json!([{"pubkey": "A"}, {"pubkey": "B"}, {"pubkey": "C"}])
                }
                _ => {
                    return Json(json!({"jsonrpc": "2.0", "id": 1,
                        "error": {"code": -32601, "message": "method not found"}}))
                }
            };
            Json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
        }),
    );
    serve(app).await
}

#[tokio::test]
async fn rpc_snapshot_becomes_onchain_signals() {
    let rpc = SolanaRpcProvider::new(fake_rpc(false).await, Duration::from_secs(5)).unwrap();
    let out = collect_bounded(&[SignalSource::Live(Box::new(rpc))]).await;

    assert_eq!(out.len(), 28);
    let (tx, programs): (Vec<_>, Vec<_>) = out.iter().partition(|s| s.metric == "transaction_volume");
    assert!(tx.iter().all(|s| s.value == 5_000_000.0));
    assert!(programs.iter().all(|s| s.metric == "program_deployments" && s.value == 3.0));
    assert!(out.iter().all(|s| s.metadata["source"] == "solana_rpc"));
}

#[tokio::test]
async fn rpc_errors_fall_back_to_mock_onchain() {
    let rpc = SolanaRpcProvider::new(fake_rpc(true).await, Duration::from_secs(5)).unwrap();
    let out = collect_bounded(&[SignalSource::Live(Box::new(rpc))]).await;
    assert_eq!(out, MockFeed::Onchain.generate(&window()));
}

// ---- language model ----

async fn detected_narratives() -> Vec<Narrative> {
    let p = Pipeline::new(PipelineConfig::default()).unwrap();
    let sources = vec![
        SignalSource::Mock(MockFeed::Onchain),
        SignalSource::Mock(MockFeed::Development),
        SignalSource::Mock(MockFeed::Social),
    ];
    let report = p
        .collect_and_run_in(&sources, &window(), &mut RunContext::new())
        .await
        .unwrap();
    assert!(!report.narratives.is_empty());
    report.narratives
}

async fn fake_chat() -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(|headers: HeaderMap, Json(req): Json<Value>| async move {
            if let Some(auth) = headers.get(header::AUTHORIZATION) {
                if auth != "Bearer sk-test" {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
            }
            let prompt = req["messages"][0]["content"].as_str().unwrap_or_default();
            let reply = if prompt.contains("IDEA 1:") {
                "IDEA 1: Agent Wallet\nKeys for bots.\n\nIDEA 2: Agent Registry\nDiscover agents.\n\nIDEA 3: Extra\nDropped."
            } else if prompt.contains("Momentum Score:") {
                "NAME: Agentic Solana\nEXPLANATION: Agents ship on-chain.\nWHY IT MATTERS:\n- Deployments spiked"
            } else {
                "?"
            };
            Json(json!({"choices": [{"message": {"role": "assistant", "content": reply}}]}))
                .into_response()
        }),
    );
    serve(app).await
}

#[tokio::test]
async fn chat_backed_enrichment_explains_and_proposes_ideas() {
    let base = fake_chat().await;
    let clients = [
        ChatClient::local(&base, "llama3", Duration::from_secs(5)).unwrap(),
        ChatClient::openai("sk-test".into(), &format!("{base}/v1"), "gpt-4o-mini", Duration::from_secs(5))
            .unwrap(),
    ];
    for client in clients {
        let mut ns = detected_narratives().await;
        let enricher = Enricher::new(Some(Arc::new(client)), 2);
        assert!(enricher.generates_ideas());
        enricher.enrich(&mut ns).await;

        for n in &ns {
            assert_eq!(n.title.as_deref(), Some("Agentic Solana"));
            assert_eq!(n.explanation.as_deref(), Some("Agents ship on-chain."));
            assert_eq!(n.why_it_matters, vec!["Deployments spiked"]);
            let titles: Vec<&str> = n.build_ideas.iter().map(|i| i.title.as_str()).collect();
            assert_eq!(titles, vec!["Agent Wallet", "Agent Registry"]);
        }
    }
}

#[tokio::test]
async fn unresponsive_model_falls_back_to_templates() {
    let base = silent_endpoint().await;
    let client = ChatClient::local(&base, "llama3", SHORT).unwrap();
    let mut ns = detected_narratives().await;
    let expected: Vec<String> = ns
        .iter()
        .map(|n| TemplateExplainer.render(n).title)
        .collect();

    let enricher = Enricher::new(Some(Arc::new(client)), 3);
    tokio::time::timeout(Duration::from_secs(20), enricher.enrich(&mut ns))
        .await
        .expect("enrichment returns once requests time out");

    let titles: Vec<String> = ns.iter().filter_map(|n| n.title.clone()).collect();
    assert_eq!(titles, expected);
    assert!(ns.iter().all(|n| n.build_ideas.is_empty()));
}
