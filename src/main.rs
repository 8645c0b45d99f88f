use std::{sync::Arc, thread, time::Duration};

use clap::Parser;
use mailpool::{
    dispatcher::Dispatcher,
    error::BoxError,
    event::DispatcherId,
    logging::init_logging,
    mailbox::PriorityMailbox,
    message::{Message, Priority},
    pool::Builder,
};

/// Run dispatchers that post prioritized messages to a shared mailbox and
/// process them on a fixed-size worker pool.
#[derive(Debug, Parser)]
#[command(name = "mailpool", version, about)]
struct Args {
    /// Worker threads in the pool
    #[arg(short, long, default_value_t = 3)]
    threads: usize,

    /// Number of dispatchers sharing the mailbox
    #[arg(short, long, default_value_t = 3)]
    dispatchers: usize,

    /// Messages to send, rotating over dispatchers and priorities
    #[arg(short, long, default_value_t = 10)]
    messages: usize,

    /// Simulated processing time per message, in milliseconds
    #[arg(long, default_value_t = 200)]
    process_ms: u64,

    /// How long to let dispatchers run before stopping them, in milliseconds
    #[arg(long, default_value_t = 2000)]
    run_ms: u64,

    /// After stopping, how long to wait for stray messages still being sent, in milliseconds
    #[arg(long, default_value_t = 50)]
    grace_ms: u64,

    /// Log spec, e.g. "info" or "mailpool=debug"
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), BoxError> {
    let args = Args::parse();
    let _logger = init_logging(&args.log_level)
        .map_err(|err| format!("failed to start logger: {err}"))?;

    if args.dispatchers == 0 {
        return Err("at least one dispatcher is required".into());
    }

    let mailbox = Arc::new(PriorityMailbox::new());
    let pool = Arc::new(Builder::new().num_threads(args.threads).build()?);

    let process_time = Duration::from_millis(args.process_ms);
    let handler = move |_: &DispatcherId, _: &Message| -> Result<(), BoxError> {
        thread::sleep(process_time);
        Ok(())
    };

    let dispatchers: Vec<_> = (0..args.dispatchers)
        .map(|i| {
            Dispatcher::new(
                format!("thread {i}"),
                Arc::clone(&mailbox),
                Arc::clone(&pool),
                handler,
            )
        })
        .collect();
    for dispatcher in &dispatchers {
        dispatcher.start()?;
    }

    let priorities = args.dispatchers as Priority;
    for i in 0..args.messages {
        let sender = &dispatchers[i % args.dispatchers];
        sender.send(format!("Message {i}"), i as Priority % priorities)?;
    }

    thread::sleep(Duration::from_millis(args.run_ms));
    for dispatcher in &dispatchers {
        dispatcher.stop();
    }
    for dispatcher in &dispatchers {
        dispatcher.join();
    }

    let mut unprocessed = 0;
    while let Some(message) = mailbox.dequeue_timeout(Duration::from_millis(args.grace_ms)) {
        log::warn!("never received: {} (priority {})", message.content(), message.priority());
        unprocessed += 1;
    }
    pool.shutdown(true);

    let stats = pool.stats();
    log::info!(
        "done: {} completed, {} failed, {} never received",
        stats.completed,
        stats.failed,
        unprocessed
    );
    Ok(())
}
