use super::*;
use axum::{body, body::Body, http::Request};
use shared::{domain::FocusMode, error::ErrorCode};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tower::ServiceExt;

fn test_state() -> Arc<AppState> {
    Arc::new(AppState {
        dispatcher: CommandDispatcher::new(FocusPublisher::new(32)),
    })
}

async fn json_body<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn post_json(uri: &str, json: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .expect("request")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = build_router(test_state());
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn dispatch_without_body_steals_focus() {
    let state = test_state();
    let mut rx = state.dispatcher.publisher().subscribe();
    let app = build_router(state);

    let request = Request::post("/dispatch")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let dto: FocusRequest = json_body(response).await;
    assert_eq!(dto.mode(), FocusMode::Steal);

    match rx.recv().await.expect("event") {
        ServerEvent::FocusInputRequested { request } => assert_eq!(request, dto),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn dispatch_with_preserve_flag_keeps_it() {
    let app = build_router(test_state());
    let response = app
        .oneshot(post_json(
            "/dispatch",
            serde_json::json!({ "preserve_focus": true }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let dto: FocusRequest = json_body(response).await;
    assert!(dto.preserve_focus());
}

#[tokio::test]
async fn command_routes_apply_defaults_and_overrides() {
    let app = build_router(test_state());

    let response = app
        .clone()
        .oneshot(
            Request::post("/commands/add_to_chat")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let code_action: FocusRequest = json_body(response).await;
    assert!(code_action.preserve_focus());
    assert_eq!(code_action.command(), Some(Command::AddToChat));

    let response = app
        .clone()
        .oneshot(post_json(
            "/commands/add_to_chat",
            serde_json::json!({ "preserve_focus": false }),
        ))
        .await
        .expect("response");
    let overridden: FocusRequest = json_body(response).await;
    assert!(!overridden.preserve_focus());

    let response = app
        .oneshot(
            Request::post("/commands/focus_chat_input")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let shortcut: FocusRequest = json_body(response).await;
    assert!(!shortcut.preserve_focus());
}

#[tokio::test]
async fn unknown_command_is_rejected() {
    let app = build_router(test_state());
    let response = app
        .oneshot(
            Request::post("/commands/format_disk")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::Validation);
    assert!(error.message.contains("format_disk"));
}

#[tokio::test]
async fn panel_status_tracks_reveal_and_hide() {
    let app = build_router(test_state());

    let response = app
        .clone()
        .oneshot(post_json("/commands/panel_button", serde_json::json!({})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let status: PanelStatus = json_body(
        app.clone()
            .oneshot(Request::get("/panel").body(Body::empty()).expect("request"))
            .await
            .expect("response"),
    )
    .await;
    assert!(status.visible);
    assert_eq!(status.dispatched, 1);

    let response = app
        .clone()
        .oneshot(
            Request::post("/panel/hide")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let status: PanelStatus = json_body(
        app.oneshot(Request::get("/panel").body(Body::empty()).expect("request"))
            .await
            .expect("response"),
    )
    .await;
    assert!(!status.visible);
}

async fn spawn_server(state: Arc<AppState>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn next_server_event<S>(ws: &mut S) -> ServerEvent
where
    S: futures::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timely event")
            .expect("stream open")
            .expect("frame");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).expect("server event");
        }
    }
}

async fn wait_for_subscribers(state: &AppState, expected: usize) {
    for _ in 0..100 {
        if state.dispatcher.publisher().subscriber_count() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscriber never registered");
}

#[tokio::test]
async fn websocket_subscriber_receives_dispatched_flag() {
    let state = test_state();
    let addr = spawn_server(Arc::clone(&state)).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws?subscriber=test"))
        .await
        .expect("connect");
    wait_for_subscribers(&state, 1).await;

    let response = build_router(Arc::clone(&state))
        .oneshot(
            Request::post("/commands/explain_code")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    match next_server_event(&mut ws).await {
        ServerEvent::FocusInputRequested { request } => {
            assert!(request.preserve_focus());
            assert_eq!(request.command(), Some(Command::ExplainCode));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn websocket_requests_dispatch_and_malformed_frames_get_an_error() {
    let state = test_state();
    let addr = spawn_server(Arc::clone(&state)).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");
    wait_for_subscribers(&state, 1).await;

    ws.send(WsMessage::Text("{not json".to_string()))
        .await
        .expect("send");
    match next_server_event(&mut ws).await {
        ServerEvent::Error(error) => assert_eq!(error.code, ErrorCode::Validation),
        other => panic!("unexpected event: {other:?}"),
    }

    let request = ClientRequest::DispatchCommand {
        command: Command::OpenPanel,
        preserve_focus: None,
    };
    ws.send(WsMessage::Text(
        serde_json::to_string(&request).expect("json"),
    ))
    .await
    .expect("send");
    match next_server_event(&mut ws).await {
        ServerEvent::FocusInputRequested { request } => {
            assert!(!request.preserve_focus());
            assert_eq!(request.command(), Some(Command::OpenPanel));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    ws.send(WsMessage::Text(
        serde_json::to_string(&ClientRequest::HidePanel).expect("json"),
    ))
    .await
    .expect("send");
    assert_eq!(next_server_event(&mut ws).await, ServerEvent::PanelHidden);
    assert!(!state.dispatcher.status().await.visible);
}

#[tokio::test]
async fn unknown_route_reports_not_found() {
    let app = build_router(test_state());
    let response = app
        .oneshot(Request::get("/nowhere").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::NotFound);
}

#[test]
fn error_replies_are_dropped_once_the_queue_is_full() {
    let (reply_tx, mut reply_rx) = mpsc::channel(REPLY_QUEUE_CAPACITY);
    let reply = || ServerEvent::Error(ApiError::validation("invalid client request"));

    for _ in 0..REPLY_QUEUE_CAPACITY {
        assert!(queue_reply(&reply_tx, reply()));
    }
    for _ in 0..100 {
        assert!(!queue_reply(&reply_tx, reply()));
    }

    let mut queued = 0;
    while reply_rx.try_recv().is_ok() {
        queued += 1;
    }
    assert_eq!(queued, REPLY_QUEUE_CAPACITY);
    assert!(queue_reply(&reply_tx, reply()));
}

#[tokio::test]
async fn lagging_websocket_subscriber_skips_to_latest_and_stays_open() {
    let state = Arc::new(AppState {
        dispatcher: CommandDispatcher::new(FocusPublisher::new(1)),
    });
    let addr = spawn_server(Arc::clone(&state)).await;

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws?subscriber=slow"))
        .await
        .expect("connect");
    wait_for_subscribers(&state, 1).await;

    // The current-thread test runtime does not run the socket's send task until this test
    // yields, so every dispatch but the last is overwritten in the one-slot queue.
    for command in [
        Command::AddToChat,
        Command::ExplainCode,
        Command::ImproveCode,
        Command::FixWithAi,
    ] {
        state.dispatcher.dispatch_command(command, None).await;
    }
    let latest = state
        .dispatcher
        .dispatch_command(Command::FocusChatInput, None)
        .await;

    assert_eq!(
        next_server_event(&mut ws).await,
        ServerEvent::FocusInputRequested { request: latest }
    );

    let after_lag = state.dispatcher.dispatch(Some(true)).await;
    assert_eq!(
        next_server_event(&mut ws).await,
        ServerEvent::FocusInputRequested { request: after_lag }
    );
}
