//! Stage execution engine

use anyhow::{Context, bail};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;

use langweave_core::connectors::{InputConnector, Message, MessageMetadata, OutputConnector};
use langweave_core::{
    Config, HttpLanguageClient, LanguageClient, NlpTransform, Outcome, StageConfig,
};

use crate::error::Result;
use crate::report::RunReport;

/// Runtime engine for executing stages
pub struct Runtime {
    config: Config,
}

impl Runtime {
    /// Create a new runtime for a loaded project
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Project configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the Natural Language client from the project's `api` settings.
    ///
    /// Call once and share the client across stage runs.
    pub fn connect(&self) -> Result<Arc<dyn LanguageClient>> {
        let client = HttpLanguageClient::from_config(&self.config.project.api)
            .context("failed to create Natural Language client")?;
        Ok(Arc::new(client))
    }

    /// Run a stage with the connectors it references
    pub async fn run(
        &self,
        stage: &StageConfig,
        client: Arc<dyn LanguageClient>,
    ) -> Result<RunReport> {
        let mut input = self
            .config
            .load_connector_config(&stage.input)
            .and_then(|c| c.open_input())
            .with_context(|| format!("stage '{}': input '{}'", stage.name, stage.input))?;
        let mut output = self
            .config
            .load_connector_config(&stage.output)
            .and_then(|c| c.open_output())
            .with_context(|| format!("stage '{}': output '{}'", stage.name, stage.output))?;
        let mut errors = match &stage.errors {
            Some(reference) => Some(
                self.config
                    .load_connector_config(reference)
                    .and_then(|c| c.open_output())
                    .with_context(|| format!("stage '{}': errors '{}'", stage.name, reference))?,
            ),
            None => None,
        };

        Self::run_stage(
            stage,
            client,
            input.as_mut(),
            output.as_mut(),
            errors.as_deref_mut(),
        )
        .await
    }

    /// Run a stage over already opened connectors
    ///
    /// Records are pulled in chunks of the stage's concurrency and analysed
    /// concurrently; outcomes are routed in input order. Outputs are flushed
    /// even when the run fails.
    pub async fn run_stage(
        stage: &StageConfig,
        client: Arc<dyn LanguageClient>,
        input: &mut dyn InputConnector,
        output: &mut dyn OutputConnector,
        mut errors: Option<&mut (dyn OutputConnector + '_)>,
    ) -> Result<RunReport> {
        let transform = NlpTransform::from_stage(stage)?;
        let mut report = RunReport::new(&stage.name);

        tracing::info!(
            stage = %stage.name,
            method = %transform.kind(),
            concurrency = stage.concurrency(),
            "Starting stage"
        );

        let processed = process(
            stage,
            &transform,
            client.as_ref(),
            input,
            output,
            errors.as_deref_mut(),
            &mut report,
        )
        .await;

        let flushed = flush(output, errors).await;
        processed?;
        flushed?;

        tracing::info!(
            stage = %stage.name,
            read = report.read,
            emitted = report.emitted,
            skipped = report.skipped,
            errored = report.errored,
            "Stage complete"
        );
        Ok(report)
    }
}

async fn process(
    stage: &StageConfig,
    transform: &NlpTransform,
    client: &dyn LanguageClient,
    input: &mut dyn InputConnector,
    output: &mut dyn OutputConnector,
    mut errors: Option<&mut (dyn OutputConnector + '_)>,
    report: &mut RunReport,
) -> Result<()> {
    let chunk_size = stage.concurrency();
    let mut exhausted = false;

    while !exhausted {
        let mut chunk = Vec::with_capacity(chunk_size);
        while chunk.len() < chunk_size {
            match input.pull().await? {
                Some(message) => chunk.push(message),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }
        if chunk.is_empty() {
            break;
        }
        report.read += chunk.len();
        tracing::debug!(stage = %stage.name, records = chunk.len(), "Analysing chunk");

        let outcomes = join_all(
            chunk
                .iter()
                .map(|message| transform_message(transform, client, message)),
        )
        .await;

        let mut routed = chunk.into_iter().zip(outcomes);
        while let Some((message, outcome)) = routed.next() {
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    // the rest of the chunk was analysed but is never written
                    input.nack(&message.metadata).await?;
                    for (unrouted, _) in routed {
                        input.nack(&unrouted.metadata).await?;
                    }
                    return Err(e.context(format!(
                        "stage '{}' stopped at {}",
                        stage.name,
                        describe(&message.metadata)
                    )));
                }
            };

            match outcome {
                Outcome::Emit(record) => {
                    output
                        .push(Message {
                            payload: record.to_json(),
                            metadata: message.metadata.clone(),
                        })
                        .await?;
                    report.emitted += 1;
                }
                Outcome::Error(entry) => {
                    let Some(errors) = errors.as_deref_mut() else {
                        bail!("stage '{}' has no errors connector", stage.name);
                    };
                    errors
                        .push(Message {
                            payload: serde_json::to_value(&entry)?,
                            metadata: message.metadata.clone(),
                        })
                        .await?;
                    report.errored += 1;
                }
                Outcome::Skip => report.skipped += 1,
            }
            input.ack(&message.metadata).await?;
        }
    }
    Ok(())
}

async fn transform_message(
    transform: &NlpTransform,
    client: &dyn LanguageClient,
    message: &Message,
) -> Result<Outcome> {
    match &message.payload {
        Value::Object(record) => Ok(transform.transform(client, record).await?),
        _ => bail!("input record is not a JSON object"),
    }
}

async fn flush(
    output: &mut dyn OutputConnector,
    errors: Option<&mut (dyn OutputConnector + '_)>,
) -> Result<()> {
    output.flush().await?;
    if let Some(errors) = errors {
        errors.flush().await?;
    }
    Ok(())
}

fn describe(metadata: &MessageMetadata) -> String {
    match (metadata.source.as_deref(), metadata.extra.get("line")) {
        (Some(source), Some(line)) => format!("{}:{}", source, line),
        (Some(source), None) => source.to_string(),
        _ => "input record".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use langweave_core::{AnalysisKind, Document, EncodingType, Error as CoreError};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::error::core_error;

    #[derive(Default)]
    struct VecInput {
        pending: VecDeque<Value>,
        acked: usize,
        nacked: usize,
    }

    impl VecInput {
        fn new(records: Vec<Value>) -> Self {
            Self {
                pending: records.into(),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl InputConnector for VecInput {
        async fn pull(&mut self) -> langweave_core::Result<Option<Message>> {
            Ok(self.pending.pop_front().map(Message::new))
        }

        async fn ack(&mut self, _metadata: &MessageMetadata) -> langweave_core::Result<()> {
            self.acked += 1;
            Ok(())
        }

        async fn nack(&mut self, _metadata: &MessageMetadata) -> langweave_core::Result<()> {
            self.nacked += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct VecOutput {
        pushed: Vec<Value>,
        flushed: bool,
    }

    #[async_trait]
    impl OutputConnector for VecOutput {
        async fn push(&mut self, message: Message) -> langweave_core::Result<()> {
            self.pushed.push(message.payload);
            Ok(())
        }

        async fn flush(&mut self) -> langweave_core::Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    /// Fails for texts starting with "fail", otherwise echoes the text back
    /// as the language. Tracks the number of calls in flight.
    #[derive(Default)]
    struct ScriptedClient {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl LanguageClient for ScriptedClient {
        async fn execute(
            &self,
            _kind: &AnalysisKind,
            document: &Document,
            _encoding: EncodingType,
        ) -> langweave_core::Result<Value> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if document.content.starts_with("fail") {
                return Err(CoreError::Service {
                    status: Some(500),
                    message: "backend error".to_string(),
                });
            }
            Ok(json!({
                "documentSentiment": {"magnitude": 0.5, "score": 0.5},
                "language": document.content,
                "sentences": []
            }))
        }
    }

    fn stage(extra: &str) -> StageConfig {
        serde_yaml::from_str(&format!(
            "name: test\nmethod: analyze_sentiment\nsource_field: body\ninput: file.input\noutput: file.output\n{}",
            extra
        ))
        .unwrap()
    }

    fn records(texts: &[Option<&str>]) -> Vec<Value> {
        texts
            .iter()
            .map(|t| match t {
                Some(text) => json!({"body": text}),
                None => json!({"body": null}),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_emits_in_input_order() {
        let client = Arc::new(ScriptedClient::default());
        let mut input = VecInput::new(records(&[Some("a"), Some("b"), Some("c"), Some("d"), Some("e")]));
        let mut output = VecOutput::default();

        let report = Runtime::run_stage(
            &stage("concurrency: 2\n"),
            client,
            &mut input,
            &mut output,
            None,
        )
        .await
        .unwrap();

        assert_eq!(report.read, 5);
        assert_eq!(report.emitted, 5);
        let languages: Vec<_> = output
            .pushed
            .iter()
            .map(|v| v["language"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(languages, ["a", "b", "c", "d", "e"]);
        assert_eq!(input.acked, 5);
        assert!(output.flushed);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let client = Arc::new(ScriptedClient::default());
        let texts: Vec<Option<&str>> = vec![Some("x"); 7];
        let mut input = VecInput::new(records(&texts));
        let mut output = VecOutput::default();

        Runtime::run_stage(
            &stage("concurrency: 3\n"),
            client.clone(),
            &mut input,
            &mut output,
            None,
        )
        .await
        .unwrap();

        assert_eq!(client.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(output.pushed.len(), 7);
    }

    #[tokio::test]
    async fn test_skip_on_error_counts_skips() {
        let client = Arc::new(ScriptedClient::default());
        let mut input = VecInput::new(records(&[Some("ok"), Some("fail 1"), None]));
        let mut output = VecOutput::default();

        let report = Runtime::run_stage(&stage(""), client, &mut input, &mut output, None)
            .await
            .unwrap();

        assert_eq!(report.emitted, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.errored, 0);
    }

    #[tokio::test]
    async fn test_send_to_error_routes_entries() {
        let client = Arc::new(ScriptedClient::default());
        let mut input = VecInput::new(records(&[Some("fail here"), Some("ok")]));
        let mut output = VecOutput::default();
        let mut errors = VecOutput::default();

        let report = Runtime::run_stage(
            &stage("on_error: send_to_error\nerrors: file.errors\n"),
            client,
            &mut input,
            &mut output,
            Some(&mut errors),
        )
        .await
        .unwrap();

        assert_eq!(report.emitted, 1);
        assert_eq!(report.errored, 1);
        assert_eq!(errors.pushed[0]["error_code"], 400);
        assert_eq!(errors.pushed[0]["record"]["body"], "fail here");
        assert!(errors.flushed);
    }

    #[tokio::test]
    async fn test_stop_on_error_flushes_and_fails() {
        let client = Arc::new(ScriptedClient::default());
        let mut input = VecInput::new(records(&[Some("ok"), Some("fail now"), Some("never")]));
        let mut output = VecOutput::default();

        let err = Runtime::run_stage(
            &stage("on_error: stop_on_error\nconcurrency: 1\n"),
            client,
            &mut input,
            &mut output,
            None,
        )
        .await
        .unwrap_err();

        assert!(matches!(core_error(&err), Some(CoreError::Service { .. })));
        assert!(err.to_string().contains("stage 'test' stopped"));
        assert_eq!(output.pushed.len(), 1);
        assert!(output.flushed);
        assert_eq!(input.nacked, 1);
        assert_eq!(input.pending.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_on_error_nacks_rest_of_chunk() {
        let client = Arc::new(ScriptedClient::default());
        let mut input = VecInput::new(records(&[
            Some("ok"),
            Some("fail now"),
            Some("after"),
            Some("also after"),
            Some("next chunk"),
        ]));
        let mut output = VecOutput::default();

        Runtime::run_stage(
            &stage("on_error: stop_on_error\nconcurrency: 4\n"),
            client,
            &mut input,
            &mut output,
            None,
        )
        .await
        .unwrap_err();

        assert_eq!(output.pushed.len(), 1);
        assert_eq!(input.acked, 1);
        assert_eq!(input.nacked, 3);
        assert_eq!(input.pending.len(), 1);
    }

    #[tokio::test]
    async fn test_non_text_input_is_fatal_under_skip() {
        let client = Arc::new(ScriptedClient::default());
        let mut input = VecInput::new(vec![json!({"body": 12})]);
        let mut output = VecOutput::default();

        let err = Runtime::run_stage(&stage(""), client, &mut input, &mut output, None)
            .await
            .unwrap_err();
        assert!(matches!(core_error(&err), Some(CoreError::NonTextInput { .. })));
    }

    #[tokio::test]
    async fn test_non_object_input_is_fatal() {
        let client = Arc::new(ScriptedClient::default());
        let mut input = VecInput::new(vec![json!("just text")]);
        let mut output = VecOutput::default();

        let err = Runtime::run_stage(&stage(""), client, &mut input, &mut output, None)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("not a JSON object"));
    }

    #[tokio::test]
    async fn test_invalid_stage_is_rejected() {
        let client = Arc::new(ScriptedClient::default());
        let mut input = VecInput::new(records(&[Some("ok")]));
        let mut output = VecOutput::default();

        let err = Runtime::run_stage(
            &stage("on_error: send_to_error\n"),
            client,
            &mut input,
            &mut output,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(core_error(&err), Some(CoreError::ConfigInvalid { .. })));
        assert_eq!(input.pending.len(), 1);
    }

    #[test]
    fn test_describe() {
        let mut metadata = MessageMetadata {
            source: Some("data/in.jsonl".to_string()),
            ..Default::default()
        };
        assert_eq!(describe(&metadata), "data/in.jsonl");
        metadata.extra.insert("line".to_string(), "4".to_string());
        assert_eq!(describe(&metadata), "data/in.jsonl:4");
        assert_eq!(describe(&MessageMetadata::default()), "input record");
    }
}
