use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use hifitime::Epoch;

use log::{debug, error, info};

use crate::{error::DecodeError, event::Assembler, packet::Packet, publish::FanOut};

/// Shared [Pipeline] counters
#[derive(Debug, Default)]
pub struct Counters {
    published: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    /// Events handed over to the consumers
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Lines that did not make it to an event
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Display for Counters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} events published, {} lines skipped",
            self.published(),
            self.skipped()
        )
    }
}

/// [Pipeline] turns detector lines into published events.
/// It is the line listener of the acquisition: one line in, at most one event out.
pub struct Pipeline {
    assembler: Assembler,
    fanout: FanOut,
    counters: Arc<Counters>,
    /// Statistics are reported every so many published events
    stats_interval: u64,
}

impl Pipeline {
    pub fn new(fanout: FanOut, stats_interval: u64) -> Self {
        Self {
            fanout,
            stats_interval,
            assembler: Assembler::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    /// Processes one line, captured now
    pub fn process(&mut self, line: &str) {
        self.process_captured(line, Epoch::now());
    }

    /// A line without capture time cannot be stamped: it is skipped
    fn process_captured<E: std::fmt::Display>(&mut self, line: &str, capture_time: Result<Epoch, E>) {
        match capture_time {
            Ok(capture_time) => self.process_at(line, capture_time),
            Err(e) => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                error!("line skipped, system time unavailable: {}", e);
            },
        }
    }

    /// Processes one line captured at `capture_time`.
    /// Lines that do not decode are counted and skipped.
    pub fn process_at(&mut self, line: &str, capture_time: Epoch) {
        match self.assemble(line, capture_time) {
            Ok(_) => {
                let published = self.counters.published.fetch_add(1, Ordering::Relaxed) + 1;
                if self.stats_interval > 0 && published % self.stats_interval == 0 {
                    info!("{}", self.counters);
                }
            },
            Err(e) => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                debug!("line skipped: {}", e);
            },
        }
    }

    fn assemble(&mut self, line: &str, capture_time: Epoch) -> Result<(), DecodeError> {
        let packet = Packet::decode(line)?;
        let event = self.assembler.assemble(packet, capture_time)?;
        self.fanout.publish(event);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::Pipeline;
    use crate::{
        link::{Interface, LineSource},
        nmea::checksum,
        publish::{FanOut, testing::Collect},
    };

    use hifitime::Epoch;
    use std::{io::Cursor, time::Duration};

    const LINE: &str = r#"{"gps":"$GPGGA,224116.473,2604.00,N,00726.691,E,1,08,1.0,10.0,M,0.0,M,,*47","timing":1.0,"energy1":[1,2,3,4,5,6,7,8,9,10],"energy2":[10,9,8,7,6,5,4,3,2,1],"altitude":10,"humidity":50,"gravitationalOrientation":{"x":0,"y":0,"z":1},"magneticOrientation":{"x":1,"y":0,"z":0},"temperature":{"value1":20,"value2":21},"uptime":123}"#;

    #[tokio::test]
    async fn end_to_end() {
        let mut fanout = FanOut::new(16, Duration::from_secs(1));
        let (collect, events) = Collect::new();
        let collecting = fanout.register(collect);

        let mut pipeline = Pipeline::new(fanout, 100);
        let counters = pipeline.counters();

        let t = Epoch::from_unix_milliseconds(1_700_000_000_000.0);
        pipeline.process_at(LINE, t);
        drop(pipeline);

        assert_eq!(collecting.await.unwrap().delivered, 1);
        assert_eq!(counters.published(), 1);
        assert_eq!(counters.skipped(), 0);

        let events = events.lock().unwrap();
        let event = &events[0];

        let point = event.geo_point.unwrap();
        assert!((point.lat - 26.0667).abs() < 1e-4);
        assert!((point.lon - 7.4448).abs() < 1e-4);
        assert_eq!(event.channel1.values(), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(event.channel2.values(), &[10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(event.timestamp, t);
        assert_eq!(event.humidity, Some(50.0));
        assert_eq!(event.temperature.unwrap().value2, Some(21.0));
    }

    #[tokio::test]
    async fn non_conforming_lines_are_skipped() {
        let mut fanout = FanOut::new(16, Duration::from_secs(1));
        let (collect, events) = Collect::new();
        let collecting = fanout.register(collect);

        let mut pipeline = Pipeline::new(fanout, 100);
        let counters = pipeline.counters();

        for line in [
            "",
            "boot: detector v1.2",
            r#"{"gps":"$GPGGA,224116.473,2604.00,N,00726.691,E,1,08,1.0,10.0,M,0.0,M,,*47","energy1":[1,2,3],"energy2":[1,2,3]}"#,
            r#"[1,2,3]"#,
        ] {
            pipeline.process(line);
        }
        drop(pipeline);

        assert_eq!(collecting.await.unwrap().delivered, 0);
        assert_eq!(counters.skipped(), 4);
        assert_eq!(counters.published(), 0);
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_empty_line() {
        let mut fanout = FanOut::new(16, Duration::from_secs(1));
        let (collect, _) = Collect::new();
        let collecting = fanout.register(collect);

        let mut pipeline = Pipeline::new(fanout, 100);
        let counters = pipeline.counters();
        pipeline.process("");
        drop(pipeline);

        assert_eq!(collecting.await.unwrap().delivered, 0);
        assert_eq!(counters.skipped(), 1);
    }

    #[tokio::test]
    async fn replayed_acquisition() {
        let mut fanout = FanOut::new(16, Duration::from_secs(1));
        let (collect, events) = Collect::new();
        let collecting = fanout.register(collect);

        let mut pipeline = Pipeline::new(fanout, 1);
        let counters = pipeline.counters();

        let content = format!("garbage\n{}\r\n{}\n", LINE, LINE);

        let mut source = LineSource::new(vec![]);
        source.attach("test", Interface::from_reader(Cursor::new(content.into_bytes())));
        source.subscribe(move |line| pipeline.process(line));
        source.run().unwrap();

        // releases the pipeline, hence the consumer queues
        drop(source);

        assert_eq!(collecting.await.unwrap().delivered, 2);
        assert_eq!(counters.published(), 2);
        assert_eq!(counters.skipped(), 1);

        let events = events.lock().unwrap();
        assert_ne!(events[0].id, events[1].id);
        assert!(events[0].id.ends_with("-1"));
        assert!(events[1].id.ends_with("-2"));
    }

    #[tokio::test]
    async fn multibyte_time_field_is_skipped() {
        let body = "GPGGA,12345é,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        let line = format!(
            r#"{{"gps":"${}*{:02X}","energy1":[1,2,3,4,5,6,7,8,9,10],"energy2":[1,2,3,4,5,6,7,8,9,10]}}"#,
            body,
            checksum(body)
        );

        let mut fanout = FanOut::new(16, Duration::from_secs(1));
        let (collect, events) = Collect::new();
        let collecting = fanout.register(collect);

        let mut pipeline = Pipeline::new(fanout, 100);
        let counters = pipeline.counters();

        let mut source = LineSource::new(vec![]);
        source.attach(
            "test",
            Interface::from_reader(Cursor::new(format!("{}\n", line).into_bytes())),
        );
        source.subscribe(move |line| pipeline.process(line));
        source.run().unwrap();
        drop(source);

        assert_eq!(collecting.await.unwrap().delivered, 0);
        assert_eq!(counters.skipped(), 1);
        assert_eq!(counters.published(), 0);
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_capture_time() {
        let mut fanout = FanOut::new(16, Duration::from_secs(1));
        let (collect, _) = Collect::new();
        let collecting = fanout.register(collect);

        let mut pipeline = Pipeline::new(fanout, 100);
        let counters = pipeline.counters();

        pipeline.process_captured(LINE, Err("clock unavailable"));
        pipeline.process_captured::<&str>(LINE, Ok(Epoch::from_unix_milliseconds(1_700_000_000_000.0)));
        drop(pipeline);

        assert_eq!(collecting.await.unwrap().delivered, 1);
        assert_eq!(counters.skipped(), 1);
        assert_eq!(counters.published(), 1);
    }
}
