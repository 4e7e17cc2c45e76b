//! Demo composition root: runs a simulated mailbox batch through the engine
//! and prints its status payload as it progresses.

use std::thread;
use std::time::Duration;

use anyhow::Context;
use secretary_jobs::{CleanupReport, JobEngine, JobEngineConfig, JobHandle, WorkBody, WorkResult};

/// Stand-in for an IMAP batch archive: every `fail_every`th message fails.
struct SimulatedArchive {
    uids: Vec<u32>,
    fail_every: u32,
    delay: Duration,
}

impl WorkBody for SimulatedArchive {
    fn run(self: Box<Self>, job: &JobHandle) -> WorkResult {
        let mut archived = Vec::new();

        for (i, uid) in self.uids.iter().enumerate() {
            if i % 5 == 0 && job.is_cancel_requested() {
                break;
            }
            job.set_current_item(format!("uid {uid}"));
            thread::sleep(self.delay);

            if uid % self.fail_every == 0 {
                job.record_failure(format!("uid {uid}: NO [TRYCREATE] Archive does not exist"));
            } else {
                archived.push(*uid);
                job.record_success();
            }
        }

        Ok(serde_json::json!({ "archived": archived }))
    }
}

fn main() -> anyhow::Result<()> {
    secretary_observability::init();

    let config = JobEngineConfig::from_env().context("loading job engine configuration")?;
    let engine = JobEngine::start(config).context("starting job engine")?;

    let uids: Vec<u32> = (1..=25).collect();
    let total = uids.len() as u64;
    let job = engine.submit_body(
        "batch_archive",
        total,
        SimulatedArchive {
            uids,
            fail_every: 7,
            delay: Duration::from_millis(20),
        },
    );

    loop {
        let snapshot = job.snapshot();
        println!("{}", serde_json::to_string(&snapshot)?);
        if snapshot.status.is_terminal() {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    let report = CleanupReport {
        removed_count: engine.cleanup(Duration::ZERO),
    };
    println!("{}", serde_json::to_string(&report)?);

    engine.shutdown();
    Ok(())
}
