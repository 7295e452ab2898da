mod support;

use axum::http::StatusCode;
use serde_json::Value;
use support::{RecordingRunner, Workspace, exit, post_json, router};

#[tokio::test]
async fn account_triple_round_trips() {
    let workspace = Workspace::new();
    let app = router(workspace.context(None, RecordingRunner::succeeding()));

    for name in ["zoe", "ada"] {
        let reply = post_json(&app, "/rpc/add_account", &format!(r#"{{"name":"{name}"}}"#)).await;
        assert_eq!(reply.status, StatusCode::NO_CONTENT);
    }
    let duplicate = post_json(&app, "/rpc/add_account", r#"{"name":"ada"}"#).await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);

    let list = post_json(&app, "/rpc/get_account_list", "{}").await;
    let json: Value = serde_json::from_slice(&list.body).expect("json");
    assert_eq!(json["accounts"], serde_json::json!(["ada", "zoe"]));

    let removed = post_json(&app, "/rpc/remove_account", r#"{"name":"zoe"}"#).await;
    assert_eq!(removed.status, StatusCode::NO_CONTENT);
    let unknown = post_json(&app, "/rpc/remove_account", r#"{"name":"zoe"}"#).await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn source_build_runs_rcpp_and_publishes_events() {
    let workspace = Workspace::new();
    let runner = RecordingRunner::new(|_| exit(1, "fib.cpp:3:5: error: 'x' was not declared", ""));
    let ctx = workspace.context(None, runner.clone());
    let mut events = ctx.builds.subscribe();
    let app = router(ctx);

    let file = workspace.root.path().join("src/fib.cpp");
    let body = format!(r#"{{"file":"{}"}}"#, file.display());
    let reply = post_json(&app, "/rpc/source_build", &body).await;
    assert_eq!(reply.status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&reply.body).expect("json");
    assert_eq!(json["succeeded"], Value::Bool(false));

    let requests = runner.requests.lock().expect("requests").clone();
    let script = requests[0].args.last().expect("script").to_string_lossy().into_owned();
    assert_eq!(script, "Rcpp::sourceCpp('fib.cpp')");

    let started = serde_json::to_value(events.recv().await.expect("started")).expect("json");
    assert_eq!(started["type"], "source_build_started");
    let completed = serde_json::to_value(events.recv().await.expect("completed")).expect("json");
    assert_eq!(completed["type"], "source_build_completed");
    assert_eq!(completed["errors"][0]["line"], 3);
    assert_eq!(completed["errors"][0]["message"], "'x' was not declared");
}
