//! End-to-end tests for the analysis pipeline
//!
//! A wiremock server stands in for the Natural Language API. Tests cover:
//! - Project loading and client construction from `langweave.yaml`
//! - Sentiment and classification round trips through flatten + project
//! - Entity metadata kept as a nested map
//! - Error policies applied to service failures, including token refresh

use rstest::rstest;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use langweave_core::auth::{ServiceAccountKey, ServiceAccountTokenSource};
use langweave_core::{
    AnalysisKind, Config, Credentials, ErrorHandling, HttpLanguageClient, NlpDirective,
    NlpTransform, Outcome, OutputValue,
};

const SENTIMENT_TEXT: &str = "This test is so awesome!";
const PHYSICS_TEXT: &str = "Quantum mechanics describes the behaviour of particles at the \
    smallest scales, where the energy of electrons and photons is quantised and \
    measurements obey the uncertainty principle.";

fn client(server: &MockServer) -> HttpLanguageClient {
    HttpLanguageClient::new(
        &server.uri(),
        Credentials::ApiKey("integration-key".to_string()),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn record(body: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("body".to_string(), json!(body));
    map
}

async fn mount_sentiment(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/documents:analyzeSentiment"))
        .and(query_param("key", "integration-key"))
        .and(body_partial_json(json!({
            "document": {"content": SENTIMENT_TEXT, "language": "en"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documentSentiment": {"magnitude": 0.9, "score": 0.9},
            "language": "en",
            "sentences": [{
                "text": {"content": SENTIMENT_TEXT, "beginOffset": 0},
                "sentiment": {"magnitude": 0.9, "score": 0.9}
            }]
        })))
        .mount(server)
        .await;
}

async fn mount_classification(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/documents:classifyText"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "categories": [
                {"name": "/Science/Physics", "confidence": 0.87},
                {"name": "/Science/Chemistry", "confidence": 0.51}
            ]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sentiment_scenario() {
    let server = MockServer::start().await;
    mount_sentiment(&server).await;

    let transform = NlpTransform::new(AnalysisKind::AnalyzeSentiment, "body")
        .with_language(Some("en".to_string()));
    let outcome = transform
        .transform(&client(&server), &record(SENTIMENT_TEXT))
        .await
        .unwrap();
    let Outcome::Emit(result) = outcome else {
        panic!("Expected emitted record, got {outcome:?}");
    };

    assert_eq!(result.schema_name(), "AnalyzeSentimentResult");
    assert_eq!(result.get("language").and_then(OutputValue::as_str), Some("en"));
    assert!(result.get("score").and_then(OutputValue::as_f64).is_some());
    assert!(result.get("magnitude").and_then(OutputValue::as_f64).is_some());

    let sentences = result.get("sentences").and_then(OutputValue::as_array).unwrap();
    assert_eq!(sentences.len(), 1);
    let sentence = sentences[0].as_record().unwrap();
    assert_eq!(
        sentence.get("content").and_then(OutputValue::as_str),
        Some(SENTIMENT_TEXT)
    );
    assert_eq!(sentence.get("beginOffset").and_then(OutputValue::as_i64), Some(0));
}

#[tokio::test]
async fn test_classification_scenario() {
    let server = MockServer::start().await;
    mount_classification(&server).await;

    let transform = NlpTransform::new(AnalysisKind::ClassifyText, "body");
    let result = transform.analyze(&client(&server), PHYSICS_TEXT).await.unwrap();

    let categories = result.get("categories").and_then(OutputValue::as_array).unwrap();
    let physics = categories
        .iter()
        .filter_map(OutputValue::as_record)
        .find(|c| {
            c.get("name")
                .and_then(OutputValue::as_str)
                .is_some_and(|n| n.to_lowercase().contains("physics"))
        })
        .expect("a physics category");
    let confidence = physics.get("confidence").and_then(OutputValue::as_f64).unwrap();
    assert!((0.0..=1.0).contains(&confidence));
}

#[tokio::test]
async fn test_entity_metadata_stays_nested() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents:analyzeEntities"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "entities": [{
                "name": "Google",
                "type": "ORGANIZATION",
                "metadata": {
                    "mid": "/m/045c7b",
                    "wikipedia_url": "https://en.wikipedia.org/wiki/Google"
                },
                "salience": 0.74,
                "mentions": [
                    {"text": {"content": "Google", "beginOffset": 0}, "type": "PROPER"},
                    {"text": {"content": "company", "beginOffset": 21}, "type": "COMMON"}
                ]
            }],
            "language": "en"
        })))
        .mount(&server)
        .await;

    let transform = NlpTransform::new(AnalysisKind::AnalyzeEntities, "body");
    let result = transform
        .analyze(&client(&server), "Google is a search company.")
        .await
        .unwrap();
    let json = result.to_json();

    let entity = &json["entities"][0];
    assert_eq!(entity["metadata"]["mid"], "/m/045c7b");
    assert!(entity.get("mid").is_none());
    assert_eq!(entity["mentions"][1]["content"], "company");
    assert_eq!(entity["mentions"][1]["beginOffset"], 21);
    assert_eq!(entity["mentions"][1]["type"], "COMMON");
}

#[tokio::test]
async fn test_service_failure_sent_to_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents:analyzeSyntax"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "The language sq is not supported for syntax analysis.",
                "status": "INVALID_ARGUMENT"
            }
        })))
        .mount(&server)
        .await;

    let transform = NlpTransform::new(AnalysisKind::AnalyzeSyntax, "body")
        .with_language(Some("sq".to_string()))
        .with_error_handling(ErrorHandling::SendToError);
    let outcome = transform
        .transform(&client(&server), &record("Përshëndetje"))
        .await
        .unwrap();
    let Outcome::Error(entry) = outcome else {
        panic!("Expected error entry, got {outcome:?}");
    };
    assert_eq!(entry.error_code, 400);
    assert!(entry.error_message.contains("not supported for syntax analysis"));
    assert_eq!(entry.record, json!({"body": "Përshëndetje"}));
}

#[rstest]
#[case(ErrorHandling::SkipOnError)]
#[case(ErrorHandling::SendToError)]
#[tokio::test]
async fn test_rejected_token_follows_error_policy(#[case] on_error: ErrorHandling) {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/documents:analyzeSentiment"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"language": "en"})))
        .expect(0)
        .mount(&server)
        .await;

    let key = ServiceAccountKey {
        client_email: "pipeline@proj.iam.gserviceaccount.com".to_string(),
        private_key: include_str!("fixtures/service_account_key.pem").to_string(),
        private_key_id: None,
        token_uri: format!("{}/token", server.uri()),
    };
    let client = HttpLanguageClient::new(
        &server.uri(),
        Credentials::ServiceAccount(ServiceAccountTokenSource::new(key)),
        Duration::from_secs(5),
    )
    .unwrap();

    let transform = NlpTransform::new(AnalysisKind::AnalyzeSentiment, "body")
        .with_error_handling(on_error);
    let outcome = transform
        .transform(&client, &record(SENTIMENT_TEXT))
        .await
        .unwrap();

    match (on_error, outcome) {
        (ErrorHandling::SkipOnError, Outcome::Skip) => {}
        (ErrorHandling::SendToError, Outcome::Error(entry)) => {
            assert_eq!(entry.error_code, 400);
            assert!(entry.error_message.contains("401"));
            assert_eq!(entry.record, json!({"body": SENTIMENT_TEXT}));
        }
        (policy, outcome) => panic!("Unexpected outcome {outcome:?} under {policy:?}"),
    }
}

#[tokio::test]
async fn test_directive_against_server() {
    let server = MockServer::start().await;
    mount_classification(&server).await;

    let directive = NlpDirective::from_name("nlp-classify-text", "body", "categories").unwrap();
    let rows = directive
        .execute(&client(&server), vec![record(PHYSICS_TEXT)])
        .await
        .unwrap();
    let raw: Value = serde_json::from_str(rows[0]["categories"].as_str().unwrap()).unwrap();
    assert_eq!(raw["categories"][0]["name"], "/Science/Physics");
}

#[tokio::test]
async fn test_project_config_drives_client() {
    let server = MockServer::start().await;
    mount_sentiment(&server).await;

    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("langweave.yaml"),
        format!(
            "name: reviews\napi:\n  endpoint: {}\n  timeout_secs: 5\n  credentials:\n    api_key: integration-key\nvars:\n  lang: en\n",
            server.uri()
        ),
    )
    .unwrap();
    std::fs::create_dir_all(dir.path().join("stages")).unwrap();
    std::fs::write(
        dir.path().join("stages/sentiment.yaml"),
        "name: sentiment\nmethod: Sentiment Analysis\nsource_field: body\nlanguage_code: ${lang}\nencoding: UTF8\ninput: file.input\noutput: file.output\n",
    )
    .unwrap();

    let config = Config::load(dir.path()).unwrap();
    let stage = config.load_stage("sentiment").unwrap();
    let client = HttpLanguageClient::from_config(&config.project.api).unwrap();
    let transform = NlpTransform::from_stage(&stage).unwrap();

    let outcome = transform.transform(&client, &record(SENTIMENT_TEXT)).await.unwrap();
    assert!(matches!(outcome, Outcome::Emit(_)));
}
