use chrono::NaiveDate;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;
use stockflow_domain::errors::ProviderError;
use stockflow_domain::repositories::price_provider::{
    FetchRequest, PriceProvider, ProviderResponse,
};
use stockflow_domain::value_objects::interval::Interval;
use stockflow_domain::value_objects::ticker::Ticker;
use stockflow_domain::value_objects::window::Window;
use stockflow_infrastructure::market_data::yahoo::YahooPriceProvider;

type Responder = dyn Fn(&str) -> (u16, String) + Send + Sync;

struct MockChartServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockChartServer {
    fn start(respond: Arc<Responder>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().expect("local addr");
        let base_url = format!("http://{}", addr);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = stop.clone();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let requests_clone = requests.clone();

        let handle = thread::spawn(move || {
            listener.set_nonblocking(true).expect("nonblocking");
            while !stop_clone.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        let _ = handle_connection(&mut stream, respond.as_ref(), &requests_clone);
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(_) => {
                        thread::sleep(Duration::from_millis(10));
                    }
                }
            }
        });

        Self {
            base_url,
            requests,
            stop,
            handle: Some(handle),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Drop for MockChartServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(
    stream: &mut TcpStream,
    respond: &Responder,
    requests: &Mutex<Vec<String>>,
) -> Result<(), String> {
    stream.set_nonblocking(false).map_err(|e| e.to_string())?;
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .map_err(|e| e.to_string())?;
    stream
        .set_write_timeout(Some(Duration::from_secs(2)))
        .map_err(|e| e.to_string())?;

    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = stream.read(&mut tmp).map_err(|e| e.to_string())?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if buf.len() > 8192 {
            break;
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let target = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    requests.lock().map_err(|e| e.to_string())?.push(target.clone());

    let (status, body) = respond(&target);
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        _ => "Error",
    };
    let header = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream
        .write_all(header.as_bytes())
        .map_err(|e| e.to_string())?;
    stream.write_all(body.as_bytes()).map_err(|e| e.to_string())?;
    Ok(())
}

fn chart_payload(close: f64) -> String {
    // Two daily bars for 2024-01-01 and 2024-01-02 (UTC midnight), exchange offset -5h.
    format!(
        r#"{{"chart":{{"result":[{{"meta":{{"gmtoffset":-18000}},"timestamp":[1704067200,1704153600],"indicators":{{"quote":[{{"open":[10.0,11.0],"high":[12.0,13.0],"low":[9.0,10.0],"close":[{close},12.5],"volume":[1000,2000]}}]}}}}],"error":null}}}}"#
    )
}

fn not_found_payload() -> String {
    r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#
        .to_string()
}

fn request_for(symbols: &[&str]) -> FetchRequest {
    let day = |d| {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .expect("valid date")
    };
    FetchRequest {
        tickers: symbols
            .iter()
            .map(|s| Ticker::parse(s).expect("ticker"))
            .collect(),
        window: Window::new(day(1), day(3)),
        interval: Interval::OneDay,
    }
}

fn provider_for(server: &MockChartServer) -> YahooPriceProvider {
    YahooPriceProvider::new(&server.base_url, Duration::from_secs(5), 2).expect("provider")
}

#[tokio::test]
async fn single_symbol_returns_single_table_with_query_params() {
    let server = MockChartServer::start(Arc::new(|_| (200, chart_payload(11.5))));
    let provider = provider_for(&server);

    let response = provider
        .fetch(&request_for(&["AAPL"]))
        .await
        .expect("fetch ok");

    let ProviderResponse::Single(series) = response else {
        panic!("expected single table for one ticker");
    };
    assert_eq!(series.bars.len(), 2);
    assert_eq!(series.bars[0].close, Some(11.5));
    assert_eq!(series.bars[1].volume, Some(2000));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let target = &requests[0];
    assert!(target.starts_with("/v8/finance/chart/AAPL?"), "{target}");
    assert!(target.contains("period1=1704067200"), "{target}");
    assert!(target.contains("period2=1704240000"), "{target}");
    assert!(target.contains("interval=1d"), "{target}");
}

#[tokio::test]
async fn multiple_symbols_keep_request_order() {
    let server = MockChartServer::start(Arc::new(|target| {
        if target.contains("/MSFT?") {
            (200, chart_payload(400.0))
        } else {
            (200, chart_payload(190.0))
        }
    }));
    let provider = provider_for(&server);

    let response = provider
        .fetch(&request_for(&["AAPL", "MSFT", "GOOG"]))
        .await
        .expect("fetch ok");

    let ProviderResponse::PerSymbol(tables) = response else {
        panic!("expected per-symbol tables");
    };
    let symbols: Vec<&str> = tables.iter().map(|(s, _)| s.as_str()).collect();
    assert_eq!(symbols, vec!["AAPL", "MSFT", "GOOG"]);
    assert_eq!(tables[1].1.bars[0].close, Some(400.0));
    assert_eq!(server.requests().len(), 3);
}

#[tokio::test]
async fn unknown_symbol_yields_empty_table() {
    let server = MockChartServer::start(Arc::new(|target| {
        if target.contains("/NOPE?") {
            (404, not_found_payload())
        } else {
            (200, chart_payload(11.5))
        }
    }));
    let provider = provider_for(&server);

    let response = provider
        .fetch(&request_for(&["AAPL", "NOPE"]))
        .await
        .expect("unknown symbol is skipped");

    let ProviderResponse::PerSymbol(tables) = response else {
        panic!("expected per-symbol tables");
    };
    assert_eq!(tables.len(), 2);
    assert_eq!(tables[0].1.bars.len(), 2);
    assert!(tables[1].1.bars.is_empty());
}

#[tokio::test]
async fn rate_limit_is_reported() {
    let server = MockChartServer::start(Arc::new(|_| (429, "Too Many Requests".to_string())));
    let provider = provider_for(&server);

    let err = provider
        .fetch(&request_for(&["AAPL"]))
        .await
        .expect_err("rate limited");
    match err {
        ProviderError::RateLimited { symbol } => assert_eq!(symbol, "AAPL"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_reported_with_status() {
    let server = MockChartServer::start(Arc::new(|_| (500, "{}".to_string())));
    let provider = provider_for(&server);

    let err = provider
        .fetch(&request_for(&["AAPL"]))
        .await
        .expect_err("server error");
    assert!(matches!(err, ProviderError::Status { status: 500, .. }));
}

#[tokio::test]
async fn unreachable_provider_is_a_request_error() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr")
    };
    let provider =
        YahooPriceProvider::new(&format!("http://{addr}"), Duration::from_secs(2), 1)
            .expect("provider");

    let err = provider
        .fetch(&request_for(&["AAPL"]))
        .await
        .expect_err("connection refused");
    assert!(matches!(
        err,
        ProviderError::Request(_) | ProviderError::Timeout(_)
    ));
}

#[test]
fn invalid_base_url_fails_fast() {
    let err = YahooPriceProvider::new("not a url", Duration::from_secs(1), 1)
        .expect_err("invalid url");
    assert!(matches!(err, ProviderError::Configuration(_)));
}
