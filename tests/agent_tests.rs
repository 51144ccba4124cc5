// SPDX-License-Identifier: Apache-2.0

//! End-to-end agent tests
//!
//! A minimal HTTP/1.1 collector runs in-process and records every request
//! the exporter sends.

use clap::Parser;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use prost::Message;
use std::io::Cursor;
use std::net::SocketAddr;
use std::time::Duration;
use stdinotel::init::agent::Agent;
use stdinotel::init::args::AgentRun;
use stdinotel::receivers::stdin::IngestErrors;
use stdinotel::receivers::stdin::convert::record_body;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const TEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Parser)]
struct Cli {
    #[command(flatten)]
    agent: AgentRun,
}

#[derive(Debug)]
struct CapturedRequest {
    request_line: String,
    head: String,
    body: Vec<u8>,
}

impl CapturedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim().eq_ignore_ascii_case(name).then(|| v.trim())
        })
    }
}

struct FakeCollector {
    addr: SocketAddr,
    requests: mpsc::UnboundedReceiver<CapturedRequest>,
}

impl FakeCollector {
    async fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, requests) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, tx.clone(), status));
            }
        });

        Self { addr, requests }
    }

    fn drain(&mut self) -> Vec<CapturedRequest> {
        let mut out = Vec::new();
        while let Ok(req) = self.requests.try_recv() {
            out.push(req);
        }
        out
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    tx: mpsc::UnboundedSender<CapturedRequest>,
    status: u16,
) {
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let header_end = loop {
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if !read_more(&mut stream, &mut buf).await {
                return;
            }
        };

        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let captured = CapturedRequest {
            request_line: head.lines().next().unwrap_or_default().to_string(),
            head,
            body: Vec::new(),
        };
        let content_length: usize = captured
            .header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            if !read_more(&mut stream, &mut buf).await {
                return;
            }
        }
        let body = buf[header_end..header_end + content_length].to_vec();
        buf.drain(..header_end + content_length);

        let _ = tx.send(CapturedRequest { body, ..captured });

        let response = format!(
            "HTTP/1.1 {} Test\r\ncontent-length: 0\r\n\r\n",
            status
        );
        if stream.write_all(response.as_bytes()).await.is_err() {
            return;
        }
    }
}

async fn read_more(stream: &mut TcpStream, buf: &mut Vec<u8>) -> bool {
    let mut chunk = [0u8; 4096];
    match stream.read(&mut chunk).await {
        Ok(0) | Err(_) => false,
        Ok(n) => {
            buf.extend_from_slice(&chunk[..n]);
            true
        }
    }
}

fn agent_args(args: &[&str]) -> AgentRun {
    let mut argv = vec!["stdinotel", "--disable-host-name"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap().agent
}

fn otlp_bodies(requests: &[CapturedRequest]) -> Vec<String> {
    requests
        .iter()
        .flat_map(|req| {
            ExportLogsServiceRequest::decode(req.body.as_slice())
                .unwrap()
                .resource_logs
        })
        .map(|logs| record_body(&logs).unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_otlphttp_export_until_input_closes() {
    let mut collector = FakeCollector::start(200).await;
    let endpoint = format!("http://{}", collector.addr);
    let args = agent_args(&["--protocol", "otlphttp", "--endpoint", &endpoint]);

    let input = Cursor::new(b"foo\nbar\nfoobar\n".to_vec());
    let res = timeout(
        TEST_TIMEOUT,
        Agent::new(args).run(input, CancellationToken::new()),
    )
    .await
    .unwrap();
    assert!(res.is_ok(), "agent failed: {:?}", res);

    let requests = collector.drain();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].request_line.starts_with("POST /v1/logs "));
    assert_eq!(
        requests[0].header("content-type"),
        Some("application/x-protobuf")
    );
    assert_eq!(otlp_bodies(&requests), vec!["foo", "bar", "foobar"]);
}

#[tokio::test]
async fn test_splunk_hec_export() {
    let mut collector = FakeCollector::start(200).await;
    let endpoint = format!("http://{}/services/collector", collector.addr);
    let args = agent_args(&[
        "--protocol",
        "splunk_hec",
        "--endpoint",
        &endpoint,
        "--token",
        "test-token",
        "--splunk-index",
        "main",
    ]);

    let input = Cursor::new(b"first event\n".to_vec());
    let res = timeout(
        TEST_TIMEOUT,
        Agent::new(args).run(input, CancellationToken::new()),
    )
    .await
    .unwrap();
    assert!(res.is_ok(), "agent failed: {:?}", res);

    let requests = collector.drain();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert!(req.request_line.starts_with("POST /services/collector "));
    assert_eq!(req.header("authorization"), Some("Splunk test-token"));

    let event: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
    assert_eq!(event["event"], "first event");
    assert_eq!(event["index"], "main");
    assert_eq!(event["fields"]["log.source"], "stdin");
}

#[tokio::test]
async fn test_oversized_line_fails_the_agent() {
    let mut collector = FakeCollector::start(200).await;
    let endpoint = format!("http://{}", collector.addr);
    let args = agent_args(&[
        "--protocol",
        "otlphttp",
        "--endpoint",
        &endpoint,
        "--max-line-bytes",
        "4",
    ]);

    let input = Cursor::new(b"ok\nwaytoolong\nnever\n".to_vec());
    let res = timeout(
        TEST_TIMEOUT,
        Agent::new(args).run(input, CancellationToken::new()),
    )
    .await
    .unwrap();

    let err = res.unwrap_err();
    assert!(err.downcast_ref::<IngestErrors>().is_some());
    assert!(err.to_string().contains("exceeds the maximum length"));

    // The line before the failure was still delivered
    assert_eq!(otlp_bodies(&collector.drain()), vec!["ok"]);
}

#[tokio::test]
async fn test_rejected_exports_do_not_fail_ingestion() {
    let mut collector = FakeCollector::start(503).await;
    let endpoint = format!("http://{}", collector.addr);
    let args = agent_args(&["--protocol", "otlphttp", "--endpoint", &endpoint]);

    let input = Cursor::new(b"a\nb\n".to_vec());
    let res = timeout(
        TEST_TIMEOUT,
        Agent::new(args).run(input, CancellationToken::new()),
    )
    .await
    .unwrap();

    assert!(res.is_ok());
    assert_eq!(collector.drain().len(), 2);
}

#[tokio::test]
async fn test_cancel_stops_agent_with_open_input() {
    let mut collector = FakeCollector::start(200).await;
    let endpoint = format!("http://{}", collector.addr);
    let args = agent_args(&["--protocol", "otlphttp", "--endpoint", &endpoint]);

    let (mut writer, reader) = tokio::io::duplex(256);
    let cancel = CancellationToken::new();
    let agent = tokio::spawn(Agent::new(args).run(reader, cancel.clone()));

    writer.write_all(b"before cancel\n").await.unwrap();
    let first = timeout(TEST_TIMEOUT, collector.requests.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(otlp_bodies(&[first]), vec!["before cancel"]);

    cancel.cancel();
    let res = timeout(TEST_TIMEOUT, agent).await.unwrap().unwrap();
    assert!(res.is_ok());
    drop(writer);
}
