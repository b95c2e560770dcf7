use anyhow::Context;
use clap::Parser;
use core::time::Duration;
use ferroq_core::QueueConfig;

/// Runtime configuration for the `ferroq-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for a single-node
/// deployment.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ferroq-server",
    version,
    about = "An HTTP service for a sharded asynchronous task queue"
)]
pub struct CliArgs {
    /// Name of the table holding task and counter items.
    ///
    /// Environment variable: `TABLE_NAME`
    #[arg(long, env = "TABLE_NAME", default_value_t = String::from("tasks"))]
    pub table_name: String,

    /// Invocation target name dispatched batches are sent to.
    ///
    /// Environment variable: `FULFILLER_NAME`
    #[arg(long, env = "FULFILLER_NAME", default_value_t = String::from("task-fulfiller"))]
    pub fulfiller_name: String,

    /// Number of shards tasks are spread over.
    ///
    /// Environment variable: `SHARD_COUNT`
    #[arg(long, env = "SHARD_COUNT", default_value_t = 2)]
    pub shard_count: u32,

    /// Maximum number of task ids per dispatched batch.
    ///
    /// Environment variable: `MAX_BATCH_SIZE`
    #[arg(long, env = "MAX_BATCH_SIZE", default_value_t = 5)]
    pub max_batch_size: usize,

    /// Maximum size of a task payload in bytes.
    ///
    /// Environment variable: `MAX_PAYLOAD_BYTES`
    #[arg(long, env = "MAX_PAYLOAD_BYTES", default_value_t = 256 * 1024)]
    pub max_payload_bytes: usize,

    /// Number of worker tasks fulfilling batches concurrently.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = 4)]
    pub num_workers: usize,

    /// Capacity of each worker's request channel. A full channel makes
    /// dispatch wait, which is bounded by the request timeout.
    ///
    /// Environment variable: `WORKER_BUFFER_SIZE`
    #[arg(long, env = "WORKER_BUFFER_SIZE", default_value_t = 64)]
    pub worker_buffer_size: usize,

    /// Milliseconds between background dispatch runs. `0` disables the
    /// scheduler; dispatch then only runs through `POST /dispatch`.
    ///
    /// Environment variable: `DISPATCH_INTERVAL_MS`
    #[arg(long, env = "DISPATCH_INTERVAL_MS", default_value_t = 1_000)]
    pub dispatch_interval_ms: u64,

    /// Deadline in milliseconds for each store call and batch submission.
    ///
    /// Environment variable: `REQUEST_TIMEOUT_MS`
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    pub request_timeout_ms: u64,

    /// Seconds to let workers drain queued batches on shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,

    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:8080"))]
    pub server_addr: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub queue: QueueConfig,
    pub num_workers: usize,
    pub worker_buffer_size: usize,
    /// `None` when periodic dispatch is disabled.
    pub dispatch_interval: Option<Duration>,
    pub shutdown_timeout: Duration,
    pub server_addr: String,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            anyhow::bail!("NUM_WORKERS must be greater than 0");
        }
        if args.worker_buffer_size == 0 {
            anyhow::bail!("WORKER_BUFFER_SIZE must be greater than 0");
        }
        if args.request_timeout_ms == 0 {
            anyhow::bail!("REQUEST_TIMEOUT_MS must be greater than 0");
        }

        let queue = QueueConfig::new(args.table_name, args.fulfiller_name)
            .with_shard_count(args.shard_count)
            .with_max_batch_size(args.max_batch_size)
            .with_max_payload_bytes(args.max_payload_bytes)
            .with_request_timeout(Duration::from_millis(args.request_timeout_ms))
            .validate()
            .context("invalid queue configuration")?;

        Ok(Self {
            queue,
            num_workers: args.num_workers,
            worker_buffer_size: args.worker_buffer_size,
            dispatch_interval: (args.dispatch_interval_ms > 0)
                .then(|| Duration::from_millis(args.dispatch_interval_ms)),
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            server_addr: args.server_addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let argv = std::iter::once("ferroq-server").chain(args.iter().copied());
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.queue.table_name, "tasks");
        assert_eq!(config.queue.fulfiller_name, "task-fulfiller");
        assert_eq!(config.queue.shard_count, 2);
        assert_eq!(config.queue.max_batch_size, 5);
        assert_eq!(config.queue.max_payload_bytes, 262_144);
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.dispatch_interval, Some(Duration::from_secs(1)));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.server_addr, "0.0.0.0:8080");
    }

    #[test]
    fn zero_interval_disables_dispatch() {
        let config = parse(&["--dispatch-interval-ms", "0"]).unwrap();
        assert_eq!(config.dispatch_interval, None);
    }

    #[test]
    fn rejects_invalid_values() {
        for args in [
            &["--num-workers", "0"][..],
            &["--shard-count", "0"],
            &["--max-batch-size", "0"],
            &["--table-name", ""],
            &["--worker-buffer-size", "0"],
        ] {
            assert!(parse(args).is_err(), "{args:?} should be rejected");
        }
    }
}
