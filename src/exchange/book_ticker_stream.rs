use std::sync::Arc;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::Duration;

use anyhow::{ Context, Result };
use futures::{ SinkExt, StreamExt };
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::{ connect_async, MaybeTlsStream, WebSocketStream };
use tracing::{ debug, info, warn };
use tungstenite::protocol::Message;

use crate::models::binance_models::{
    BinanceBookTickerEvent,
    BinanceStreamMessage,
    StreamSubscription,
};
use crate::models::ticker::{ Ticker, TickerBook };

const BINANCE_STREAM_URL: &str = "wss://stream.binance.com:9443/stream";
const TESTNET_STREAM_URL: &str = "wss://testnet.binance.vision/stream";

/// Streams per websocket connection
const STREAMS_PER_CONNECTION: usize = 200;

const MIN_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Longest wait for a frame before the shutdown flag is checked again
const READ_TIMEOUT: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Keeps a `TickerBook` current from `<symbol>@bookTicker` streams
pub struct BookTickerStream {
    endpoint: String,
    book: Arc<TickerBook>,
    shutdown: Arc<AtomicBool>,
}

impl BookTickerStream {
    pub fn new(testnet: bool, book: Arc<TickerBook>, shutdown: Arc<AtomicBool>) -> Self {
        let endpoint = if testnet { TESTNET_STREAM_URL } else { BINANCE_STREAM_URL };
        Self {
            endpoint: endpoint.into(),
            book,
            shutdown,
        }
    }

    /// Open one connection per chunk of symbols, each reconnecting on its own
    pub fn spawn(self: &Arc<Self>, symbols: &[String]) -> Vec<JoinHandle<()>> {
        info!(
            symbols = symbols.len(),
            connections = symbols.len().div_ceil(STREAMS_PER_CONNECTION),
            "Starting book ticker streams"
        );
        symbols
            .chunks(STREAMS_PER_CONNECTION)
            .enumerate()
            .map(|(id, chunk)| tokio::spawn(self.clone().run_connection(id, chunk.to_vec())))
            .collect()
    }

    async fn run_connection(self: Arc<Self>, id: usize, symbols: Vec<String>) {
        let mut backoff = MIN_BACKOFF;

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.session(id, &symbols).await {
                Ok(()) => {
                    backoff = MIN_BACKOFF;
                    info!(connection = id, "Book ticker stream closed");
                }
                Err(e) => warn!(connection = id, "Book ticker stream failed: {:#}", e),
            }
            self.forget(id, &symbols);

            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Drop prices of a connection that stopped updating them
    fn forget(&self, id: usize, symbols: &[String]) {
        for symbol in symbols {
            self.book.remove(symbol);
        }
        debug!(connection = id, symbols = symbols.len(), "Cleared prices of a closed connection");
    }

    async fn session(&self, id: usize, symbols: &[String]) -> Result<()> {
        let (mut ws_stream, _) = connect_async(self.endpoint.as_str()).await.with_context(||
            format!("Failed to connect to {}", self.endpoint)
        )?;
        self.subscribe(&mut ws_stream, id, symbols).await?;
        info!(connection = id, symbols = symbols.len(), "Subscribed to book tickers");

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                let _ = ws_stream.close(None).await;
                return Ok(());
            }

            let message = match tokio::time::timeout(READ_TIMEOUT, ws_stream.next()).await {
                Err(_) => {
                    continue;
                }
                Ok(None) => {
                    return Ok(());
                }
                Ok(Some(message)) => message.context("Websocket read failed")?,
            };

            match message {
                Message::Text(text) => {
                    self.handle_text(text.as_str());
                }
                Message::Ping(data) => {
                    ws_stream.send(Message::Pong(data)).await?;
                }
                Message::Close(frame) => {
                    debug!(connection = id, ?frame, "Server closed the stream");
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    async fn subscribe(&self, ws_stream: &mut WsStream, id: usize, symbols: &[String]) -> Result<()> {
        let subscription = StreamSubscription {
            method: "SUBSCRIBE".to_string(),
            params: symbols
                .iter()
                .map(|symbol| format!("{}@bookTicker", symbol.to_lowercase()))
                .collect(),
            id: (id as u64) + 1,
        };
        let text = serde_json::to_string(&subscription)?;
        ws_stream.send(Message::Text(text.into())).await.context("Failed to send subscription")?;
        Ok(())
    }

    /// Apply one stream frame, returns whether the book changed
    pub fn handle_text(&self, text: &str) -> bool {
        match serde_json::from_str::<BinanceStreamMessage<BinanceBookTickerEvent>>(text) {
            Ok(message) => {
                let event = message.data;
                self.book.update(&event.symbol, Ticker {
                    bid_price: event.bid_price,
                    bid_qty: event.bid_qty,
                    ask_price: event.ask_price,
                    ask_qty: event.ask_qty,
                });
                true
            }
            Err(_) => {
                // subscription acks look like {"result":null,"id":1}
                debug!("Ignoring stream message: {}", text);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ticker::MarketSnapshot;

    #[test]
    fn test_frames_update_book() {
        let book = Arc::new(TickerBook::new());
        let stream = BookTickerStream::new(false, book.clone(), Arc::new(AtomicBool::new(false)));

        assert!(!stream.handle_text(r#"{"result":null,"id":1}"#));
        assert!(
            stream.handle_text(
                r#"{"stream":"ethbtc@bookTicker","data":{"u":1,"s":"ETHBTC","b":"0.06100000","B":"3.1","a":"0.06110000","A":"2.0"}}"#
            )
        );

        let ticker = book.ticker("ETHBTC").unwrap();
        assert_eq!(ticker.bid_price, 0.061);
        assert_eq!(ticker.ask_price, 0.0611);
        assert_eq!(ticker.bid_qty, 3.1);
    }

    #[tokio::test]
    async fn test_dropped_connection_clears_its_prices() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // accept and hang up before the websocket handshake
        let server = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                drop(socket);
            }
        });

        let book = Arc::new(TickerBook::new());
        book.update("ETHBTC", Ticker::new(0.061, 0.0611));
        book.update("BNBBTC", Ticker::new(0.0071, 0.0072));
        let shutdown = Arc::new(AtomicBool::new(false));
        let stream = Arc::new(BookTickerStream {
            endpoint: format!("ws://{}/stream", addr),
            book: book.clone(),
            shutdown: shutdown.clone(),
        });

        let handle = tokio::spawn(stream.run_connection(0, vec!["ETHBTC".to_string()]));

        tokio::time
            ::timeout(Duration::from_secs(5), async {
                while book.ticker("ETHBTC").is_some() {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }).await
            .expect("prices of the dead connection were kept");
        assert!(book.ticker("BNBBTC").is_some());

        shutdown.store(true, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        server.abort();
    }
}
