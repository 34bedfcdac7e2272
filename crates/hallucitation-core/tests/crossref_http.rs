//! Pipeline runs against the real CrossRef client talking to local sockets.
//!
//! One listener accepts connections and never answers; the other answers
//! every request at once and records when each one arrived.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use hallucitation_core::backend::StaticBackend;
use hallucitation_core::score::mock::MockDetector;
use hallucitation_core::verify::crossref::CrossRef;
use hallucitation_core::{
    BibliographicAuthority, CitationQuery, Classification, Config, HttpClient, PaperRecord,
    PaperStatus, Pipeline, PipelineEvent, RateLimiters, RetryPolicy, Store, TextExtractor,
    VerificationMethod, VerifyOutcome,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const REFS: [&str; 4] = [
    "A. Vaswani, N. Shazeer. Attention is all you need. In NeurIPS, 2017.",
    "J. Devlin, M. Chang. BERT: Pre-training of deep bidirectional transformers. In NAACL, 2019.",
    "K. He, X. Zhang. Deep residual learning for image recognition. In CVPR, 2016.",
    "I. Goodfellow, J. Pouget-Abadie. Generative adversarial nets. In NeurIPS, 2014.",
];

fn paper_text(refs: &[&str]) -> String {
    let mut text = String::from("Title\n\n1 Introduction\n\n");
    for i in 1..=refs.len() {
        text.push_str(&format!("See [{i}] for details. "));
    }
    text.push_str("\n\nReferences\n\n");
    for (i, r) in refs.iter().enumerate() {
        text.push_str(&format!("[{}] {}\n\n", i + 1, r));
    }
    text
}

/// Accepts connections and holds them open without ever responding.
async fn stalled_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{addr}/works")
}

/// Answers every request with an empty CrossRef result list.
async fn empty_works_server(arrivals: Arc<Mutex<Vec<std::time::Instant>>>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let arrivals = Arc::clone(&arrivals);
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                arrivals.lock().unwrap().push(std::time::Instant::now());
                let body = r#"{"status":"ok","message":{"items":[]}}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}/works")
}

fn crossref(url: &str, policy: RetryPolicy, limiters: RateLimiters) -> CrossRef {
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let http = HttpClient::with_client(client, policy, Arc::new(limiters));
    CrossRef::new(http, Some("lab@example.org".into())).with_base_url(url)
}

fn pipeline_for(
    dir: &tempfile::TempDir,
    refs: &[&str],
    authority: CrossRef,
    detector: MockDetector,
    config: Config,
) -> Pipeline {
    let file = "P001.pdf";
    std::fs::write(dir.path().join(file), b"%PDF-1.4").unwrap();
    let backend = StaticBackend::new().with_text(file, paper_text(refs));
    let store = Store::open_in_memory().unwrap();
    store
        .upsert_paper(&PaperRecord::new("P001", dir.path().join(file)))
        .unwrap();
    Pipeline::new(
        Arc::new(config),
        TextExtractor::new(Arc::new(backend)),
        Arc::new(authority),
        Arc::new(detector),
        store,
    )
}

fn no_progress(_: PipelineEvent) {}

// ── timeouts ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn stalled_crossref_exhausts_retries() {
    let url = stalled_server().await;
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_secs(1),
        timeout: Duration::from_secs(5),
    };
    let cr = crossref(&url, policy, RateLimiters::unlimited());
    let query = CitationQuery {
        raw: REFS[0].into(),
        title: Some("Attention is all you need".into()),
        year: Some(2017),
    };

    let start = tokio::time::Instant::now();
    let outcome = cr.verify(&query).await;

    match outcome {
        VerifyOutcome::NotAvailable { reason } => {
            assert!(reason.contains("not available after 3 attempt"), "{reason}");
        }
        other => panic!("expected NotAvailable, got {other:?}"),
    }
    // Three timed-out attempts plus backoffs of 1s and 2s.
    assert!(start.elapsed() >= Duration::from_secs(17));
}

#[tokio::test(start_paused = true)]
async fn timed_out_citation_is_uncertain_and_paper_processed() {
    let url = stalled_server().await;
    let policy = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_secs(1),
        timeout: Duration::from_secs(3),
    };
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline_for(
        &dir,
        &REFS[..1],
        crossref(&url, policy, RateLimiters::unlimited()),
        MockDetector::constant(0.99),
        Config::default(),
    );

    let summary = pipeline
        .run_batch(None, &CancellationToken::new(), &no_progress)
        .await
        .unwrap();
    assert_eq!(summary.papers_processed, 1);
    assert_eq!(summary.uncertain, 1);

    let store = pipeline.store().unwrap();
    assert_eq!(
        store.paper("P001").unwrap().unwrap().status,
        PaperStatus::Processed
    );
    let c = &store.citations(Some("P001")).unwrap()[0];
    assert_eq!(c.classification, Classification::Uncertain);
    assert_eq!(c.verification_method, VerificationMethod::CrossRef);
    assert!(c.crossref_score.is_none());
    assert_eq!(c.gptzero_score, Some(0.99));
    let reason = c.failure_reason.as_deref().unwrap();
    assert!(reason.contains("not available after 2 attempt"), "{reason}");
}

// ── rate limiting ───────────────────────────────────────────────────

#[tokio::test]
async fn shared_limiter_spaces_concurrent_lookups() {
    let arrivals = Arc::new(Mutex::new(Vec::new()));
    let url = empty_works_server(Arc::clone(&arrivals)).await;
    let policy = RetryPolicy {
        max_attempts: 1,
        base_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(10),
    };
    let period = Duration::from_millis(100);
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        citation_concurrency: 4,
        ..Config::default()
    };
    let pipeline = pipeline_for(
        &dir,
        &REFS,
        crossref(&url, policy, RateLimiters::new(period)),
        MockDetector::constant(0.1),
        config,
    );

    pipeline
        .run_batch(None, &CancellationToken::new(), &no_progress)
        .await
        .unwrap();

    let arrivals = arrivals.lock().unwrap().clone();
    assert_eq!(arrivals.len(), 4);
    let span = arrivals[3].duration_since(arrivals[0]);
    assert!(span >= period * 5 / 2, "4 lookups arrived within {span:?}");

    let citations = pipeline.store().unwrap().citations(Some("P001")).unwrap();
    let seqs: Vec<_> = citations.iter().map(|c| c.seq).collect();
    assert_eq!(seqs, [1, 2, 3, 4]);
    assert!(
        citations
            .iter()
            .all(|c| c.classification == Classification::Uncertain && c.failure_reason.is_none())
    );
}
