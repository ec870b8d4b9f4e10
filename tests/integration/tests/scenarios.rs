//! End-to-end request scenarios through configured applications.

use rstest::rstest;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use trellis_apps::Configurator;
use trellis_http::Request;
use trellis_integration_tests::*;
use trellis_middleware::MemoryTransactionBackend;
use trellis_test::TestApp;

fn minimal(root: trellis_controllers::ControllerNode) -> TestApp {
	TestApp::new(Configurator::minimal().make_app(root, None).unwrap())
}

#[rstest]
#[tokio::test]
async fn test_hello_world() {
	let app = minimal(hello_root());

	let response = app.get("/").await.unwrap();
	response.assert_status(200);
	assert_eq!(response.text(), "Hello World");
	assert!(response.header("content-type").unwrap().starts_with("text/html"));

	let response = app.get("/hello/Bob").await.unwrap();
	assert_eq!(response.json::<Value>().unwrap(), json!({"greeting": "Hello Bob"}));

	let response = app.get("/hello?name=Alice").await.unwrap();
	assert_eq!(response.json::<Value>().unwrap(), json!({"greeting": "Hello Alice"}));
}

#[rstest]
#[tokio::test]
async fn test_unknown_path_is_404() {
	minimal(hello_root()).get("/nowhere").await.unwrap().assert_status(404);
}

#[rstest]
#[case("/movies", json!({"movies": ["Alien", "Heat"]}))]
#[case("/movies/7", json!({"movie": "7"}))]
#[tokio::test]
async fn test_rest_get(#[case] path: &str, #[case] expected: Value) {
	let response = minimal(movies_root()).get(path).await.unwrap();
	response.assert_status(200);
	assert_eq!(response.json::<Value>().unwrap(), expected);
}

#[rstest]
#[case("PUT", json!({"updated": "7"}))]
#[case("DELETE", json!({"deleted": "7"}))]
#[tokio::test]
async fn test_rest_verb_override_from_post(#[case] verb: &str, #[case] expected: Value) {
	let response = minimal(movies_root())
		.post_form("/movies/7", &[("_method", verb)])
		.await
		.unwrap();
	response.assert_status(200);
	assert_eq!(response.json::<Value>().unwrap(), expected);
}

#[rstest]
#[tokio::test]
async fn test_rest_put_verb() {
	let response = minimal(movies_root())
		.put_json("/movies/9", &json!({}))
		.await
		.unwrap();
	assert_eq!(response.json::<Value>().unwrap(), json!({"updated": "9"}));
}

#[rstest]
#[case("/movies/7?_method=DELETE")]
#[case("/movies/7?_method=put")]
#[tokio::test]
async fn test_get_cannot_impersonate_unsafe_verbs(#[case] path: &str) {
	minimal(movies_root()).get(path).await.unwrap().assert_status(405);
}

#[rstest]
#[tokio::test]
async fn test_validation_success() {
	let response = minimal(validated_root()).get("/add?a=4&b=x").await.unwrap();
	assert_eq!(response.json::<Value>().unwrap(), json!({"a": 4, "b": "x"}));
}

#[rstest]
#[tokio::test]
async fn test_validation_failure_goes_to_error_handler() {
	let response = minimal(validated_root())
		.post_form("/add", &[("a", "NaN"), ("b", "x")])
		.await
		.unwrap();
	response.assert_status(200);
	let payload = response.json::<Value>().unwrap();
	assert_eq!(payload["submitted"], json!({"a": "NaN", "b": "x"}));
	assert_eq!(payload["errors"]["a"], "Please enter an integer value");
}

#[rstest]
#[tokio::test]
async fn test_pagination_second_page() {
	let response = minimal(paginated_root()).get("/list?page=2").await.unwrap();
	let payload = response.json::<Value>().unwrap();
	assert_eq!(payload["items"], json!((11..=20).collect::<Vec<_>>()));

	let page = &payload["paginators"]["items"];
	assert_eq!(page["page"], 2);
	assert_eq!(page["page_count"], 5);
	assert_eq!(page["links"]["first"], "/list?page=1");
	assert_eq!(page["links"]["next"], "/list?page=3");
}

#[rstest]
#[tokio::test]
async fn test_pagination_last_page_is_short() {
	let response = minimal(paginated_root()).get("/list?page=5").await.unwrap();
	let payload = response.json::<Value>().unwrap();
	assert_eq!(payload["items"], json!([41, 42]));
}

#[rstest]
#[tokio::test]
async fn test_custom_format_by_extension() {
	let app = TestApp::new(feed_configurator().make_app(feed_root(), None).unwrap());

	let response = app.get("/feed.xml").await.unwrap();
	response.assert_status(200);
	assert!(response.header("content-type").unwrap().starts_with("text/xml"));
	assert_eq!(
		response.text(),
		"<feed><entry>first</entry><entry>second</entry></feed>"
	);

	let response = app.get("/feed").await.unwrap();
	assert!(response.header("content-type").unwrap().starts_with("text/html"));
	assert_eq!(response.text(), "<ul><li>first</li><li>second</li></ul>");
}

#[rstest]
#[case(3, 200, 3, 1, 2)]
#[case(2, 500, 2, 0, 2)]
#[tokio::test]
async fn test_transient_failures_are_retried(
	#[case] attempts: i64,
	#[case] status: u16,
	#[case] calls_made: usize,
	#[case] committed: usize,
	#[case] rolled_back: usize,
) {
	let backend = Arc::new(MemoryTransactionBackend::new());
	let calls = Arc::new(AtomicUsize::new(0));
	let (configurator, conf) = transactional(backend.clone(), attempts);
	let app = configurator.make_app(flaky_root(calls.clone(), 2), Some(&conf)).unwrap();

	let response = TestApp::new(app).get("/flaky").await.unwrap();
	response.assert_status(status);
	assert_eq!(calls.load(Ordering::SeqCst), calls_made);
	assert_eq!(backend.stats().begun.load(Ordering::SeqCst), calls_made);
	assert_eq!(backend.stats().committed.load(Ordering::SeqCst), committed);
	assert_eq!(backend.stats().rolled_back.load(Ordering::SeqCst), rolled_back);
}

#[rstest]
#[tokio::test]
async fn test_prepared_request_through_the_full_stack() {
	let conf: trellis_conf::Blueprint = [("session.enabled", "true")].into_iter().collect();
	let app = TestApp::new(Configurator::full_stack().make_app(hello_root(), Some(&conf)).unwrap());
	let request = Request::builder().uri("/hello/Eve").build().unwrap();
	let response = app.request(request).await.unwrap();
	assert_eq!(response.json::<Value>().unwrap()["greeting"], "Hello Eve");
}
