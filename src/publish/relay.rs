use log::{debug, info};

use tokio::{
    io::{AsyncWriteExt, BufWriter},
    net::TcpStream,
};

use crate::{error::ConsumerError, event::CosmicEvent, publish::Consumer};

/// [RelaySink] forwards events to a supervision endpoint,
/// as JSON lines over TCP.
pub struct RelaySink {
    /// `host:port`
    address: String,

    /// Active connection
    stream: Option<BufWriter<TcpStream>>,
}

impl RelaySink {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            stream: None,
        }
    }

    async fn connect(&mut self) -> Result<(), ConsumerError> {
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        info!("relay - connected to {}", self.address);
        self.stream = Some(BufWriter::new(stream));
        Ok(())
    }

    async fn send(&mut self, message: &[u8]) -> Result<(), ConsumerError> {
        let stream = self.stream.as_mut().ok_or(ConsumerError::NotConnected)?;
        stream.write_all(message).await?;
        stream.flush().await?;
        Ok(())
    }
}

impl Consumer for RelaySink {
    fn name(&self) -> &str {
        "relay"
    }

    async fn prepare(&mut self) -> Result<(), ConsumerError> {
        self.connect().await
    }

    async fn on_event(&mut self, event: &CosmicEvent) -> Result<(), ConsumerError> {
        if self.stream.is_none() {
            self.connect().await?;
        }

        let mut message = serde_json::to_vec(event)?;
        message.push(b'\n');

        if let Err(e) = self.send(&message).await {
            debug!("relay - dropping connection to {}", self.address);
            self.stream = None;
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::RelaySink;
    use crate::{error::ConsumerError, event::fixture, publish::Consumer};

    use serde_json::Value;
    use tokio::{
        io::{AsyncBufReadExt, BufReader},
        net::TcpListener,
    };

    #[tokio::test]
    async fn events_are_relayed_as_json_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            let mut received = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                received.push(serde_json::from_str::<Value>(&line).unwrap());
            }
            received
        });

        let events = fixture(2);
        let mut relay = RelaySink::new(&address);
        relay.prepare().await.unwrap();
        for event in events.iter() {
            relay.on_event(event).await.unwrap();
        }
        drop(relay);

        let received = server.await.unwrap();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0]["id"], events[0].id.as_str());
        assert_eq!(received[1]["id"], events[1].id.as_str());
    }

    #[tokio::test]
    async fn unreachable_endpoint() {
        // bind then release, so nothing listens on that port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut relay = RelaySink::new(&address);
        assert!(matches!(relay.prepare().await, Err(ConsumerError::Io(_))));
        assert!(matches!(
            relay.on_event(&fixture(1)[0]).await,
            Err(ConsumerError::Io(_))
        ));
    }
}
