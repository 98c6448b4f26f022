//! Concurrent content digester. A producer feeds a bounded channel of jobs, a pool of
//! worker threads streams each file through every requested algorithm in a single pass,
//! and results are handed to a consumer callback in completion order. Results are not
//! ordered with respect to the input; the path field identifies each result.

use std::collections::HashMap;
use std::io;
use std::thread;

use crossbeam_channel::bounded;
use log::debug;

use crate::cancel::Cancel;
use crate::digest::{DigestAlgorithm, HexDigest, MultiDigestWriter};
use crate::error::{DigestMismatch, OcflError, Result};
use crate::fs::FileSystem;

/// A unit of digest work: one file, one or more algorithms
#[derive(Debug, Clone)]
pub struct DigestJob {
    pub path: String,
    pub algorithms: Vec<DigestAlgorithm>,
}

/// The outcome of digesting one file. `result` is an error when the file could not be
/// read.
#[derive(Debug)]
pub struct DigestOutcome {
    pub path: String,
    pub result: Result<HashMap<DigestAlgorithm, HexDigest>>,
}

/// Expected digests for one file, used in validation mode
#[derive(Debug, Clone)]
pub struct DigestExpectation {
    pub path: String,
    pub expected: HashMap<DigestAlgorithm, HexDigest>,
}

/// The digester pipeline. Worker count defaults to the machine's hardware parallelism.
pub struct DigesterPipeline<'a> {
    fs: &'a dyn FileSystem,
    concurrency: usize,
    cancel: Cancel,
}

impl<'a> DigesterPipeline<'a> {
    pub fn new(fs: &'a dyn FileSystem, concurrency: Option<usize>, cancel: Cancel) -> Self {
        let concurrency = concurrency.unwrap_or_else(num_cpus::get).max(1);
        Self {
            fs,
            concurrency,
            cancel,
        }
    }

    /// Runs every job through the worker pool, invoking the consumer once per job. The
    /// consumer runs on the calling thread. If the consumer returns an error, or the
    /// cancellation token fires, the producer stops, the workers drain, and no further
    /// results are delivered.
    pub fn run<I, F>(&self, jobs: I, mut consumer: F) -> Result<()>
    where
        I: IntoIterator<Item = DigestJob>,
        I::IntoIter: Send,
        F: FnMut(DigestOutcome) -> Result<()>,
    {
        let (job_tx, job_rx) = bounded::<DigestJob>(self.concurrency * 2);
        let (result_tx, result_rx) = bounded::<DigestOutcome>(self.concurrency * 2);

        let fs = self.fs;
        let cancel = &self.cancel;
        let jobs = jobs.into_iter();

        let mut consumer_result: Result<()> = Ok(());

        thread::scope(|scope| {
            let producer_cancel = cancel.clone();
            scope.spawn(move || {
                for job in jobs {
                    if producer_cancel.is_cancelled() {
                        break;
                    }
                    if job_tx.send(job).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..self.concurrency {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let worker_cancel = cancel.clone();
                scope.spawn(move || {
                    while let Ok(job) = job_rx.recv() {
                        if worker_cancel.is_cancelled() {
                            break;
                        }

                        debug!("Digesting {}", job.path);

                        let outcome = DigestOutcome {
                            result: digest_file(fs, &job),
                            path: job.path,
                        };

                        if result_tx.send(outcome).is_err() {
                            break;
                        }
                    }
                });
            }

            // The scope retains no senders, so the consumer loop ends when the last
            // worker exits
            drop(job_rx);
            drop(result_tx);

            while let Ok(outcome) = result_rx.recv() {
                if consumer_result.is_err() || cancel.is_cancelled() {
                    // once failed or cancelled, results are drained, not delivered, so
                    // workers blocked on a full channel can observe the stop and exit
                    continue;
                }

                if let Err(e) = consumer(outcome) {
                    cancel.cancel();
                    consumer_result = Err(e);
                }
            }
        });

        if consumer_result.is_ok() {
            self.cancel.check()?;
        }

        consumer_result
    }

    /// Validation mode: recomputes every expected digest and reports each file that does
    /// not match. All mismatches for a file are joined into a single `FixityCheck`
    /// error. Read failures are reported through the same callback. Returning an error
    /// from the callback stops the pipeline.
    pub fn validate<I, F>(&self, expectations: I, mut on_failure: F) -> Result<()>
    where
        I: IntoIterator<Item = DigestExpectation>,
        F: FnMut(OcflError) -> Result<()>,
    {
        let mut expected_by_path: HashMap<String, HashMap<DigestAlgorithm, HexDigest>> =
            HashMap::new();
        let mut jobs = Vec::new();

        for expectation in expectations {
            jobs.push(DigestJob {
                path: expectation.path.clone(),
                algorithms: expectation.expected.keys().copied().collect(),
            });
            expected_by_path.insert(expectation.path, expectation.expected);
        }

        self.run(jobs, |outcome| {
            match outcome.result {
                Ok(digests) => {
                    let expected = match expected_by_path.get(&outcome.path) {
                        Some(expected) => expected,
                        None => return Ok(()),
                    };

                    let mut mismatches = Vec::new();

                    for (algorithm, expected_digest) in expected {
                        match digests.get(algorithm) {
                            Some(found) if found == expected_digest => (),
                            Some(found) => mismatches.push(DigestMismatch::new(
                                algorithm.to_string(),
                                expected_digest.clone(),
                                found.clone(),
                            )),
                            None => (),
                        }
                    }

                    mismatches.sort_by(|a, b| a.algorithm.cmp(&b.algorithm));

                    if !mismatches.is_empty() {
                        on_failure(OcflError::FixityCheck {
                            path: outcome.path,
                            mismatches,
                        })?;
                    }
                }
                Err(e) => {
                    on_failure(OcflError::General(format!(
                        "Failed to digest {}: {}",
                        outcome.path, e
                    )))?;
                }
            }

            Ok(())
        })
    }
}

fn digest_file(
    fs: &dyn FileSystem,
    job: &DigestJob,
) -> Result<HashMap<DigestAlgorithm, HexDigest>> {
    let mut writer = MultiDigestWriter::new(&job.algorithms, io::sink());
    let mut file = fs.open_file(&job.path)?;

    io::copy(&mut file, &mut writer)?;

    Ok(writer.finalize_hex())
}
