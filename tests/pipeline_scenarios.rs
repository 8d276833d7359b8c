//! End-to-end pipeline runs against mock category endpoints

use async_trait::async_trait;
use mockito::Matcher;
use qorch::analysis::{parse_classified_line, AdapterError, Decomposer, Decomposition, LlmAnalyzer};
use qorch::executor::{ExecutionError, ExecutorOptions, TaskExecutor};
use qorch::llm::{OpenAiCompatConfig, OpenAiCompatProvider};
use qorch::pipeline::{
    PipelineCoordinator, PipelineLimits, Query, RunState, SubQuery, TraceRole, SENTINEL,
};
use qorch::routing::{Category, RouteTable};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Decomposer that returns a fixed classified list
struct Fixed(Vec<SubQuery>);

#[async_trait]
impl Decomposer for Fixed {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn decompose(&self, _query: &Query) -> Result<Decomposition, AdapterError> {
        Ok(Decomposition::Classified(self.0.clone()))
    }
}

/// Fixed classified list returned after a delay
struct Slow(Duration, Vec<SubQuery>);

#[async_trait]
impl Decomposer for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    async fn decompose(&self, _query: &Query) -> Result<Decomposition, AdapterError> {
        tokio::time::sleep(self.0).await;
        Ok(Decomposition::Classified(self.1.clone()))
    }
}

/// Decomposer that never answers in time
struct Stalled;

#[async_trait]
impl Decomposer for Stalled {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn decompose(&self, _query: &Query) -> Result<Decomposition, AdapterError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Decomposition::Classified(Vec::new()))
    }
}

/// Endpoint that accepts connections and never responds
async fn hanging_endpoint() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}/ofd", addr)
}

#[derive(Default)]
struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

/// Endpoint that answers after `delay` and records the peak number of
/// concurrent requests
async fn counting_endpoint(delay: Duration) -> (String, Arc<InFlight>) {
    use axum::{extract::State, routing::post, Json, Router};

    let counter = Arc::new(InFlight::default());
    let app = Router::new()
        .route(
            "/tkg",
            post(move |State(counter): State<Arc<InFlight>>| async move {
                let now = counter.current.fetch_add(1, Ordering::SeqCst) + 1;
                counter.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                counter.current.fetch_sub(1, Ordering::SeqCst);
                Json(serde_json::json!({"answer": "ok"}))
            }),
        )
        .with_state(counter.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/tkg", addr), counter)
}

fn executor_with(routes: RouteTable, options: ExecutorOptions) -> Arc<TaskExecutor> {
    Arc::new(TaskExecutor::with_options(Arc::new(routes), options).unwrap())
}

fn executor(routes: RouteTable) -> Arc<TaskExecutor> {
    let options = ExecutorOptions {
        timeout: Duration::from_secs(5),
        max_retries: 0,
        ..ExecutorOptions::default()
    };
    executor_with(routes, options)
}

#[tokio::test]
async fn tkg_sub_query_is_answered_through_its_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let tkg = server
        .mock("POST", "/tkg")
        .match_body(Matcher::Json(serde_json::json!({
            "query": "What is the GDP trend from 2010-2020?"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"answer":"rising"}"#)
        .expect(1)
        .create_async()
        .await;

    let routes = RouteTable::from_routes([(Category::Tkg, format!("{}/tkg", server.url()))]).unwrap();
    let decomposer = Arc::new(Fixed(vec![SubQuery::new(
        "What is the GDP trend from 2010-2020?",
        "TKG",
    )]));

    let run = PipelineCoordinator::new(decomposer, executor(routes))
        .run(Query::new("What is the GDP trend from 2010-2020?"))
        .await;

    tkg.assert_async().await;
    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.results.len(), 1);
    let answer = run.final_answer.unwrap();
    assert!(answer.contains(SENTINEL));
    assert!(answer.contains("rising"));
    assert_eq!(run.trace.last().unwrap().role, TraceRole::Aggregator);
}

#[tokio::test]
async fn unrouted_category_is_reported_without_failing_the_run() {
    let sub_query = parse_classified_line("category:CAUSAL, query:does X cause Y").unwrap();
    assert_eq!(sub_query.category, "CAUSAL");

    let mut server = mockito::Server::new_async().await;
    let routes = RouteTable::from_routes([
        (Category::Ofd, format!("{}/ofd", server.url())),
        (Category::Tkg, format!("{}/tkg", server.url())),
    ])
    .unwrap();
    let untouched = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let run = PipelineCoordinator::new(Arc::new(Fixed(vec![sub_query])), executor(routes))
        .run(Query::new("does X cause Y"))
        .await;

    untouched.assert_async().await;
    assert_eq!(run.state, RunState::Done);
    assert_eq!(
        run.results[0].error(),
        Some(&ExecutionError::InvalidCategory {
            category: "CAUSAL".into()
        })
    );
    let answer = run.final_answer.unwrap();
    assert!(answer.contains("No sub-query returned an answer"));
    assert!(answer.contains("Invalid category: CAUSAL"));
}

#[tokio::test]
async fn upstream_500_does_not_affect_siblings() {
    let mut server = mockito::Server::new_async().await;
    let _ofd = server
        .mock("POST", "/ofd")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;
    let _tkg = server
        .mock("POST", "/tkg")
        .with_status(200)
        .with_body(r#"{"answer":"rising"}"#)
        .create_async()
        .await;
    let _causal = server
        .mock("POST", "/causal")
        .with_status(200)
        .with_body(r#"{"result":"yes"}"#)
        .create_async()
        .await;

    let routes = RouteTable::from_routes([
        (Category::Ofd, format!("{}/ofd", server.url())),
        (Category::Tkg, format!("{}/tkg", server.url())),
        (Category::Causal, format!("{}/causal", server.url())),
    ])
    .unwrap();
    let decomposer = Arc::new(Fixed(vec![
        SubQuery::new("which entities?", "OFD"),
        SubQuery::new("what trend?", "TKG"),
        SubQuery::new("does it cause?", "CAUSAL"),
    ]));

    let run = PipelineCoordinator::new(decomposer, executor(routes))
        .run(Query::new("entities, trend, cause"))
        .await;

    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.results.len(), run.sub_queries.len());
    assert_eq!(
        run.results[0].error(),
        Some(&ExecutionError::UpstreamStatus {
            status: 500,
            body: "boom".into()
        })
    );
    assert_eq!(run.results[1].payload().unwrap()["answer"], "rising");
    assert_eq!(run.results[2].payload().unwrap()["result"], "yes");

    // Results stay aligned with sub-query order
    for (sub_query, result) in run.sub_queries.iter().zip(&run.results) {
        assert_eq!(sub_query, &result.sub_query);
    }
}

#[tokio::test]
async fn decomposition_timeout_fails_the_run() {
    let limits = PipelineLimits {
        analysis_timeout: Duration::from_millis(100),
        ..PipelineLimits::default()
    };
    let run = PipelineCoordinator::new(Arc::new(Stalled), executor(RouteTable::default()))
        .with_limits(limits)
        .run(Query::new("anything"))
        .await;

    assert_eq!(run.state, RunState::Failed);
    assert!(run.results.is_empty());
    assert!(run.final_answer.is_none());
    assert!(run.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn run_deadline_bounds_a_slow_pipeline() {
    let limits = PipelineLimits {
        run_timeout: Duration::from_millis(100),
        analysis_timeout: Duration::from_secs(60),
        ..PipelineLimits::default()
    };
    let run = PipelineCoordinator::new(Arc::new(Stalled), executor(RouteTable::default()))
        .with_limits(limits)
        .run(Query::new("anything"))
        .await;

    assert_eq!(run.state, RunState::Failed);
    assert!(run.error.unwrap().contains("did not finish"));
}

#[tokio::test]
async fn llm_analysis_drives_routing() {
    let mut llm = mockito::Server::new_async().await;
    let completion = serde_json::json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": "category:TKG, query:How did sales change over time?\ncategory:CAUSAL, query:Did the campaign cause the change?"
            }
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
    });
    let _chat = llm
        .mock("POST", "/v1/chat/completions")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(completion.to_string())
        .create_async()
        .await;

    let mut upstream = mockito::Server::new_async().await;
    let _tkg = upstream
        .mock("POST", "/tkg")
        .with_status(200)
        .with_body(r#"{"answer":"up 12%"}"#)
        .create_async()
        .await;
    let _causal = upstream
        .mock("POST", "/causal")
        .with_status(200)
        .with_body(r#"{"answer":"likely"}"#)
        .create_async()
        .await;

    let provider = OpenAiCompatProvider::new(
        OpenAiCompatConfig::new("local", format!("{}/v1/chat/completions", llm.url()))
            .with_model("test-model"),
    )
    .unwrap();
    let analyzer = Arc::new(LlmAnalyzer::new(Arc::new(provider)));
    let routes = RouteTable::from_routes([
        (Category::Tkg, format!("{}/tkg", upstream.url())),
        (Category::Causal, format!("{}/causal", upstream.url())),
    ])
    .unwrap();

    let run = PipelineCoordinator::new(analyzer, executor(routes))
        .run(Query::new("How did sales change and why?"))
        .await;

    assert_eq!(run.state, RunState::Done);
    let categories: Vec<&str> = run.sub_queries.iter().map(|s| s.category.as_str()).collect();
    assert_eq!(categories, vec!["TKG", "CAUSAL"]);
    let answer = run.final_answer.unwrap();
    assert!(answer.contains("up 12%"));
    assert!(answer.contains("likely"));
}

#[tokio::test]
async fn timed_out_sub_query_leaves_siblings_intact() {
    let mut server = mockito::Server::new_async().await;
    let _tkg = server
        .mock("POST", "/tkg")
        .with_status(200)
        .with_body(r#"{"answer":"rising"}"#)
        .create_async()
        .await;

    let routes = RouteTable::from_routes([
        (Category::Ofd, hanging_endpoint().await),
        (Category::Tkg, format!("{}/tkg", server.url())),
    ])
    .unwrap();
    let options = ExecutorOptions {
        timeout: Duration::from_millis(300),
        max_retries: 0,
        ..ExecutorOptions::default()
    };
    let decomposer = Arc::new(Fixed(vec![
        SubQuery::new("which entities?", "OFD"),
        SubQuery::new("what trend?", "TKG"),
    ]));

    let run = PipelineCoordinator::new(decomposer, executor_with(routes, options))
        .run(Query::new("entities and trend"))
        .await;

    assert_eq!(run.state, RunState::Done);
    assert!(run.results[0].error().is_some_and(ExecutionError::is_timeout));
    assert_eq!(run.results[1].payload().unwrap()["answer"], "rising");
}

#[tokio::test]
async fn run_deadline_keeps_finished_sub_queries() {
    let mut server = mockito::Server::new_async().await;
    let _tkg = server
        .mock("POST", "/tkg")
        .with_status(200)
        .with_body(r#"{"answer":"rising"}"#)
        .create_async()
        .await;

    let routes = RouteTable::from_routes([
        (Category::Ofd, hanging_endpoint().await),
        (Category::Tkg, format!("{}/tkg", server.url())),
    ])
    .unwrap();
    // One retry pushes the hanging call past the run deadline
    let options = ExecutorOptions {
        timeout: Duration::from_millis(300),
        max_retries: 1,
        retry_backoff: Duration::from_millis(250),
        ..ExecutorOptions::default()
    };
    let decomposer = Arc::new(Slow(
        Duration::from_millis(300),
        vec![
            SubQuery::new("which entities?", "OFD"),
            SubQuery::new("what trend?", "TKG"),
        ],
    ));
    let limits = PipelineLimits {
        run_timeout: Duration::from_millis(800),
        ..PipelineLimits::default()
    };

    let started = Instant::now();
    let run = PipelineCoordinator::new(decomposer, executor_with(routes, options))
        .with_limits(limits)
        .run(Query::new("entities and trend"))
        .await;

    assert!(started.elapsed() < Duration::from_millis(1100));
    assert_eq!(run.state, RunState::Done);
    assert_eq!(run.results.len(), 2);
    let pending = run.results[0].error().unwrap();
    assert!(pending.is_timeout());
    assert!(pending.to_string().contains("run deadline"));
    assert_eq!(run.results[1].payload().unwrap()["answer"], "rising");
    assert!(run.final_answer.unwrap().contains("rising"));
}

async fn run_fan_out(max_concurrency: usize) -> (Duration, usize) {
    let (endpoint, counter) = counting_endpoint(Duration::from_millis(150)).await;
    let routes = RouteTable::from_routes([(Category::Tkg, endpoint)]).unwrap();
    let decomposer = Arc::new(Fixed(
        (0..4)
            .map(|i| SubQuery::new(format!("trend {}?", i), "TKG"))
            .collect(),
    ));
    let limits = PipelineLimits {
        max_concurrency,
        ..PipelineLimits::default()
    };

    let started = Instant::now();
    let run = PipelineCoordinator::new(decomposer, executor(routes))
        .with_limits(limits)
        .run(Query::new("four trends"))
        .await;
    let elapsed = started.elapsed();

    assert_eq!(run.state, RunState::Done);
    assert!(run.results.iter().all(|r| r.is_success()));
    (elapsed, counter.peak.load(Ordering::SeqCst))
}

#[tokio::test]
async fn fan_out_respects_max_concurrency() {
    let (serial_elapsed, serial_peak) = run_fan_out(1).await;
    assert_eq!(serial_peak, 1);
    assert!(serial_elapsed >= Duration::from_millis(600));

    let (parallel_elapsed, parallel_peak) = run_fan_out(4).await;
    assert!(parallel_peak > 1, "peak in-flight was {}", parallel_peak);
    assert!(parallel_elapsed < serial_elapsed);
}
