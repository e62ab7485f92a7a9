use std::io::BufRead;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Deserialize;

use crate::enrichment::{Attributes, EnricherChain};
use crate::error::FlowmonError;
use crate::model::flow::RawFlow;
use crate::state::FlowTable;

/// Records buffered between the reader and the workers.
const CHANNEL_CAPACITY: usize = 1024;

/// One line of decoded-record input: the flow fields plus any attributes the
/// producer already attached.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DecodedRecord {
    #[serde(flatten)]
    pub flow: RawFlow,
    #[serde(default)]
    pub attributes: Attributes,
}

/// Parse one input line. Blank lines yield `None`.
pub fn decode_line(line_no: usize, line: &str) -> Result<Option<DecodedRecord>, FlowmonError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|source| FlowmonError::Decode {
            line: line_no,
            source,
        })
}

/// Runs the enricher chain on a decoded record and hands the result to the
/// flow table.
#[derive(Clone)]
pub struct FlowConsumer {
    table: Arc<FlowTable>,
    enrichers: Arc<EnricherChain>,
}

impl FlowConsumer {
    pub fn new(table: Arc<FlowTable>, enrichers: Arc<EnricherChain>) -> Self {
        Self { table, enrichers }
    }

    pub fn table(&self) -> &Arc<FlowTable> {
        &self.table
    }

    pub fn consume(&self, record: DecodedRecord) {
        let DecodedRecord {
            flow,
            mut attributes,
        } = record;
        self.enrichers.run(&flow, &mut attributes);
        self.table.process_message(&flow, &attributes);
    }
}

/// Result of reading one input stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub records: u64,
    pub skipped: u64,
}

/// Fixed set of named worker threads draining a bounded channel into a
/// `FlowConsumer`.
pub struct WorkerPool {
    tx: Sender<DecodedRecord>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(consumer: FlowConsumer, workers: usize) -> Result<Self, FlowmonError> {
        let (tx, rx) = bounded::<DecodedRecord>(CHANNEL_CAPACITY);
        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers.max(1) {
            let rx = rx.clone();
            let consumer = consumer.clone();
            let h = thread::Builder::new()
                .name(format!("flowmon-worker-{i}"))
                .spawn(move || worker_loop(&rx, &consumer))
                .map_err(|e| FlowmonError::Fatal(format!("spawn worker thread: {e}")))?;
            handles.push(h);
        }
        log::info!("Started {} ingest worker(s)", handles.len());
        Ok(Self { tx, handles })
    }

    pub fn submit(&self, record: DecodedRecord) -> Result<(), FlowmonError> {
        self.tx
            .send(record)
            .map_err(|_| FlowmonError::Fatal("all ingest workers exited".to_string()))
    }

    /// Close the channel and wait for the queued records to be consumed.
    pub fn finish(self) -> Result<(), FlowmonError> {
        drop(self.tx);
        let mut panicked = 0;
        for h in self.handles {
            if h.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(FlowmonError::Fatal(format!(
                "{panicked} ingest worker(s) panicked"
            )));
        }
        Ok(())
    }
}

fn worker_loop(rx: &Receiver<DecodedRecord>, consumer: &FlowConsumer) {
    for record in rx.iter() {
        consumer.consume(record);
    }
}

/// Decode every line of `reader` and submit it to `pool`. Malformed lines are
/// logged and counted, never fatal.
pub fn read_records(reader: impl BufRead, pool: &WorkerPool) -> Result<IngestStats, FlowmonError> {
    let mut stats = IngestStats::default();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(FlowmonError::Io)?;
        match decode_line(i + 1, &line) {
            Ok(Some(record)) => {
                pool.submit(record)?;
                stats.records += 1;
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Skipping input: {e}");
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

/// Ingest a whole stream with `workers` threads and wait for it to be fully
/// aggregated.
pub fn ingest_all(
    reader: impl BufRead,
    consumer: FlowConsumer,
    workers: usize,
) -> Result<IngestStats, FlowmonError> {
    let pool = WorkerPool::spawn(consumer, workers)?;
    let read = read_records(reader, &pool);
    pool.finish()?;
    let stats = read?;
    log::info!(
        "Ingested {} record(s), skipped {} malformed line(s)",
        stats.records,
        stats.skipped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{AttrValue, attr};
    use crate::model::fields::TableMode;
    use std::io::Cursor;

    fn consumer() -> FlowConsumer {
        FlowConsumer::new(
            Arc::new(FlowTable::new(TableMode::Normal)),
            Arc::new(EnricherChain::new()),
        )
    }

    #[test]
    fn decodes_flow_and_attributes() {
        let rec = decode_line(
            1,
            r#"{"src_addr":"10.0.0.1","src_port":443,"bytes":100,"attributes":{"DPName":"sw0","OFTable":-1}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(rec.flow.src_addr, Some("10.0.0.1".parse().unwrap()));
        assert_eq!(rec.flow.src_port, 443);
        assert_eq!(rec.flow.bytes, 100);
        assert_eq!(rec.flow.dst_addr, None);
        assert_eq!(rec.attributes.get(attr::DP_NAME), Some(&AttrValue::from("sw0")));
        assert_eq!(rec.attributes.get(attr::OF_TABLE), Some(&AttrValue::Int(-1)));
    }

    #[test]
    fn blank_line_is_skipped() {
        assert!(decode_line(3, "   ").unwrap().is_none());
    }

    #[test]
    fn malformed_line_reports_position() {
        let err = decode_line(7, "{not json").unwrap_err();
        assert!(matches!(err, FlowmonError::Decode { line: 7, .. }));
        assert!(err.to_string().contains("line 7"));
    }

    #[test]
    fn ingest_counts_and_skips() {
        let input = "{\"src_port\":1,\"bytes\":10}\n\ngarbage\n{\"src_port\":2,\"bytes\":20}\n";
        let c = consumer();
        let stats = ingest_all(Cursor::new(input), c.clone(), 2).unwrap();
        assert_eq!(stats, IngestStats { records: 2, skipped: 1 });
        assert_eq!(c.table().message_count(), 2);
        assert_eq!(c.table().aggregate_count(), 2);
    }

    #[test]
    fn zero_workers_still_runs_one() {
        let c = consumer();
        let stats = ingest_all(Cursor::new("{\"bytes\":5}\n"), c.clone(), 0).unwrap();
        assert_eq!(stats.records, 1);
        assert_eq!(c.table().message_count(), 1);
    }
}
