//! End-to-end tests through the real router: WebSocket ports and one-shot
//! messages, with a scripted provider behind the broker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use askbridge_broker::{Broker, BrokerHandle, Collaborators, FeedbackSink, OptionsLauncher};
use askbridge_core::{BridgeConfig, Error, Result};
use askbridge_providers::{
    AnswerEvent, AnswerProvider, AnswerRequest, Disposer, ProviderConfigs, ProviderSource,
    Resolver,
};
use askbridge_server::{routes, AppState};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

#[derive(Clone, Copy)]
enum Behavior {
    Answer,
    Hang,
}

struct FakeProvider {
    behavior: Behavior,
    disposed: Arc<AtomicUsize>,
}

impl FakeProvider {
    async fn play(&self, request: AnswerRequest) -> Result<Disposer> {
        match self.behavior {
            Behavior::Answer => {
                request
                    .on_event
                    .emit(AnswerEvent::Chunk(json!({"text": "4", "messageId": "m", "conversationId": "c"})));
                request.on_event.emit(AnswerEvent::Done);
            }
            Behavior::Hang => request.signal.cancelled().await,
        }
        let disposed = self.disposed.clone();
        Ok(Disposer::new("fake", move || {
            disposed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}

impl AnswerProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn generate_answer(&self, request: AnswerRequest) -> BoxFuture<'_, Result<Disposer>> {
        Box::pin(self.play(request))
    }
}

struct FakeSource {
    behavior: Behavior,
    disposed: Arc<AtomicUsize>,
}

impl ProviderSource for FakeSource {
    fn select(&self) -> BoxFuture<'_, Result<Box<dyn AnswerProvider>>> {
        Box::pin(async move {
            Ok(Box::new(FakeProvider {
                behavior: self.behavior,
                disposed: self.disposed.clone(),
            }) as Box<dyn AnswerProvider>)
        })
    }
}

struct FakeResolver {
    token: Option<&'static str>,
}

impl Resolver for FakeResolver {
    fn get_provider_configs(&self) -> BoxFuture<'_, Result<ProviderConfigs>> {
        Box::pin(async {
            Ok(ProviderConfigs {
                provider: "chatgpt".into(),
                configs: Default::default(),
            })
        })
    }

    fn get_access_token(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.token
                .map(String::from)
                .ok_or_else(|| Error::Credential("UNAUTHORIZED".into()))
        })
    }
}

struct NoFeedback;

impl FeedbackSink for NoFeedback {
    fn send_feedback<'a>(&'a self, _token: &'a str, _data: &'a Value) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

struct NoLauncher;

impl OptionsLauncher for NoLauncher {
    fn open_options_page(&self) -> Result<()> {
        Ok(())
    }
}

struct TestApp {
    router: Router,
    broker: BrokerHandle,
    disposed: Arc<AtomicUsize>,
    _dir: tempfile::TempDir,
}

fn test_app(behavior: Behavior, token: Option<&'static str>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = BridgeConfig::from_env(dir.path()).unwrap();
    let disposed = Arc::new(AtomicUsize::new(0));

    let source = Arc::new(FakeSource {
        behavior,
        disposed: disposed.clone(),
    });
    let services = Collaborators {
        resolver: Arc::new(FakeResolver { token }),
        feedback: Arc::new(NoFeedback),
        launcher: Arc::new(NoLauncher),
    };
    let broker = Broker::new(source, services).start();
    let router = routes::build_router(Arc::new(AppState::new(config, broker.client())));

    TestApp {
        router,
        broker,
        disposed,
        _dir: dir,
    }
}

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("ws://{}/api/port", addr)
}

async fn next_json<S>(socket: &mut S) -> Value
where
    S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_websocket_question_round_trip() {
    let app = test_app(Behavior::Answer, Some("tok"));
    let url = serve(app.router.clone()).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket
        .send(Message::Text(json!({"question": "2+2?"}).to_string()))
        .await
        .unwrap();

    assert_eq!(
        next_json(&mut socket).await,
        json!({"text": "4", "messageId": "m", "conversationId": "c"})
    );
    assert_eq!(next_json(&mut socket).await, json!({"event": "DONE"}));

    socket.close(None).await.unwrap();
    app.broker.shutdown().await;
    assert_eq!(app.disposed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_websocket_rejects_non_json_question() {
    let app = test_app(Behavior::Answer, Some("tok"));
    let url = serve(app.router.clone()).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket.send(Message::Text("2+2?".into())).await.unwrap();

    let reply = next_json(&mut socket).await;
    let error = reply["error"].as_str().unwrap();
    assert!(error.starts_with("Invalid request"), "{error}");
    assert_eq!(app.disposed.load(Ordering::SeqCst), 0);
    app.broker.shutdown().await;
}

#[tokio::test]
async fn test_closing_socket_cancels_the_answer() {
    let app = test_app(Behavior::Hang, Some("tok"));
    let url = serve(app.router.clone()).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket
        .send(Message::Text(json!({"question": "long one"}).to_string()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    socket.close(None).await.unwrap();
    drop(socket);

    tokio::time::timeout(Duration::from_secs(2), async {
        while app.disposed.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("disposer never ran");
    assert_eq!(app.disposed.load(Ordering::SeqCst), 1);
    app.broker.shutdown().await;
}

async fn post_message(router: Router, message: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/message")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(message.to_string()))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_get_access_token_message() {
    let app = test_app(Behavior::Answer, Some("tok-1"));
    let (status, body) = post_message(app.router.clone(), json!({"type": "GET_ACCESS_TOKEN"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": "tok-1"}));
    app.broker.shutdown().await;
}

#[tokio::test]
async fn test_one_shot_failure_is_500() {
    let app = test_app(Behavior::Answer, None);
    let (status, body) = post_message(app.router.clone(), json!({"type": "GET_ACCESS_TOKEN"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "UNAUTHORIZED"}));
    app.broker.shutdown().await;
}

#[tokio::test]
async fn test_unknown_message_type_has_null_response() {
    let app = test_app(Behavior::Answer, Some("tok"));
    let (status, body) = post_message(app.router.clone(), json!({"type": "PING"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"response": null}));
    app.broker.shutdown().await;
}

#[tokio::test]
async fn test_health() {
    let app = test_app(Behavior::Answer, Some("tok"));
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(serde_json::from_slice::<Value>(&bytes).unwrap(), json!({"status": "ok"}));
    app.broker.shutdown().await;
}
