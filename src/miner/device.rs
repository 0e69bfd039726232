//! The per device batch loop and the kernel self-tests.

use super::selector::MiningDevice;
use super::state::MiningState;
use super::{hash_score, solution_score, MinerConfig, MinerError, Solution};
use crate::ext::DeviceExt;
use crate::krist::address::Address;
use crate::krist::block::ShortHash;
use crate::krist::nonce;
use crate::utils::HashRate;
use indicatif::ProgressBar;
use log::{debug, info};
use ocl::{Buffer, MemFlags, ProQue, Program};
use sha2::{Digest, Sha256};
use std::str;
use std::time::Instant;

/// OpenCL program source shared by every worker.
const KERNEL_SRC: &str = include_str!("kristmine.cl");

/// Randomized self-test rounds per device.
const TEST_ROUNDS: usize = 16;

/// Inputs for the fixed self-test round, spread across the SIMD lanes.
const TEST_WORDS: [&[u8]; 4] = [b"abc", b"def", b"ghi", b"jkl"];

/// One OpenCL device, compiled and ready to mine.
pub struct DeviceMiner {
    pq: ProQue,
    name: String,
    prefix: [u8; 2],
    vecsize: u8,
    worksize: u32,
}

impl DeviceMiner {
    /// Compile the kernel for the device and size the batch loop.
    pub fn init(entry: &MiningDevice, cfg: &MinerConfig) -> Result<DeviceMiner, MinerError> {
        let vecsize = match cfg.vector_size {
            Some(v) => v.0,
            None => entry.device.preferred_vecsize()?,
        };

        let worksize = match cfg.worksize {
            Some(w) => w,
            None => entry.device.default_worksize()?.min(u32::MAX as usize) as u32,
        };

        let mut program = Program::builder();
        program.src(KERNEL_SRC).cmplr_def("VECSIZE", vecsize as i32);
        if entry.device.has_extension("cl_amd_media_ops")? {
            program.cmplr_def("BITALIGN", 1);
        }

        let pq = ProQue::builder()
            .platform(entry.platform)
            .device(entry.device)
            .prog_bldr(program)
            .build()
            .map_err(|e| MinerError::Build(e.to_string()))?;

        let prefix = nonce::random_prefix();

        debug!(
            "initialized {} with prefix {} (vector size {}, worksize {})",
            entry.name,
            str::from_utf8(&prefix).unwrap_or("??"),
            vecsize,
            worksize
        );

        Ok(DeviceMiner {
            pq,
            name: entry.name.clone(),
            prefix,
            vecsize,
            worksize,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Known-answer and randomized checks against the device kernels.
    pub fn test(&self) -> Result<(), MinerError> {
        debug!("testing {}", self.name);

        let lanes = self.vecsize as usize;

        let known: Vec<Vec<u8>> = TEST_WORDS.iter().take(lanes).map(|w| w.to_vec()).collect();
        self.test_round(&known)?;

        for _ in 0..TEST_ROUNDS {
            let inputs: Vec<Vec<u8>> = (0..lanes)
                .map(|_| rand::random::<[u8; 32]>().to_vec())
                .collect();
            self.test_round(&inputs)?;
        }

        Ok(())
    }

    /// Run one digest/score round over the given per-lane inputs.
    fn test_round(&self, inputs: &[Vec<u8>]) -> Result<(), MinerError> {
        let lanes = self.vecsize as usize;
        debug_assert_eq!(inputs.len(), lanes);
        let len = inputs[0].len();

        // byte j of lane i lands at [i + j * lanes]
        let mut interleaved = vec![0u8; lanes * 64];
        for (i, input) in inputs.iter().enumerate() {
            for (j, &b) in input.iter().enumerate() {
                interleaved[i + j * lanes] = b;
            }
        }

        let input_buf = Buffer::builder()
            .queue(self.pq.queue().clone())
            .len(interleaved.len())
            .copy_host_slice(&interleaved)
            .build()?;

        let hash_buf = Buffer::builder()
            .queue(self.pq.queue().clone())
            .len(lanes * 32)
            .fill_val(0u8)
            .build()?;

        let score_buf = Buffer::<u64>::builder()
            .queue(self.pq.queue().clone())
            .len(lanes)
            .fill_val(0u64)
            .build()?;

        let digest_kernel = self
            .pq
            .kernel_builder("test_digest")
            .arg(&input_buf)
            .arg(len as u32)
            .arg(&hash_buf)
            .build()?;

        let score_kernel = self
            .pq
            .kernel_builder("test_score")
            .arg(&hash_buf)
            .arg(&score_buf)
            .build()?;

        unsafe {
            digest_kernel.cmd().global_work_size(1).enq()?;
            score_kernel.cmd().global_work_size(1).enq()?;
        }

        let mut hashes = vec![0u8; lanes * 32];
        let mut scores = vec![0u64; lanes];
        hash_buf.read(&mut hashes).enq()?;
        score_buf.read(&mut scores).enq()?;
        self.pq.finish()?;

        for (i, input) in inputs.iter().enumerate() {
            let expected: [u8; 32] = Sha256::digest(input).into();

            let mut got = [0u8; 32];
            for (j, b) in got.iter_mut().enumerate() {
                *b = hashes[i + j * lanes];
            }

            if got != expected {
                return Err(MinerError::SelfTest {
                    device: self.name.clone(),
                    message: format!(
                        "digest mismatch for {:02x?}: expected {}, got {}",
                        input,
                        hex::encode(expected),
                        hex::encode(got)
                    ),
                });
            }

            let expected_score = hash_score(&expected);
            if scores[i] != expected_score {
                return Err(MinerError::SelfTest {
                    device: self.name.clone(),
                    message: format!(
                        "score mismatch: expected {}, got {}",
                        expected_score, scores[i]
                    ),
                });
            }
        }

        Ok(())
    }

    /// Mine on this device until the shared state reports a stop.
    pub fn mine(self, state: &MiningState, pb: &ProgressBar) -> Result<(), MinerError> {
        let address_buf = Buffer::builder()
            .queue(self.pq.queue().clone())
            .len(Address::LENGTH)
            .copy_host_slice(&state.address().as_bytes()[..])
            .flags(MemFlags::new().read_only().host_no_access())
            .build()?;

        let block_buf = Buffer::builder()
            .queue(self.pq.queue().clone())
            .len(ShortHash::HEX_LENGTH)
            .fill_val(0u8)
            .flags(MemFlags::new().read_only().host_write_only())
            .build()?;

        let prefix_buf = Buffer::builder()
            .queue(self.pq.queue().clone())
            .len(self.prefix.len())
            .copy_host_slice(&self.prefix)
            .flags(MemFlags::new().read_only().host_no_access())
            .build()?;

        let solution_buf = Buffer::builder()
            .queue(self.pq.queue().clone())
            .len(Solution::NONCE_LENGTH)
            .fill_val(0u8)
            .flags(MemFlags::new().read_write())
            .build()?;

        let kernel = self
            .pq
            .kernel_builder("mine")
            .arg_named("address", &address_buf)
            .arg_named("block", &block_buf)
            .arg_named("prefix", &prefix_buf)
            .arg_named("offset", 0u64)
            .arg_named("work", 0u64)
            .arg_named("solution", &solution_buf)
            .build()?;

        let batch = self.worksize as u64 * self.vecsize as u64;

        loop {
            pb.set_message("waiting for work");

            let (target, generation) = match state.wait_for_target() {
                Some(t) => t,
                None => break,
            };

            debug!(
                "{}: target changed, work {} block {}",
                self.name, target.work, target.block
            );

            block_buf.write(target.block.into_hex().as_bytes()).enq()?;
            kernel.set_arg("work", target.work)?;

            // each target starts the nonce walk over; the prefix keeps
            // workers from retracing each other
            let mut offset = 0u64;

            while state.is_current(generation) {
                let cycle = Instant::now();

                kernel.set_arg("offset", offset)?;
                unsafe { kernel.cmd().global_work_size(self.worksize as usize).enq()? };

                let mut nonce = [0u8; Solution::NONCE_LENGTH];
                solution_buf.read(&mut nonce[..]).enq()?;

                state.add_hashes(batch);
                pb.set_message(format!(
                    "mining at {}",
                    HashRate {
                        hashes: batch,
                        elapsed: cycle.elapsed(),
                    }
                ));

                if nonce[0] != 0 {
                    solution_buf.cmd().fill(0u8, None).enq()?;

                    // a find from a dead target proves nothing
                    if state.generation() == generation && !state.is_stopped() {
                        let solution = Solution {
                            address: state.address(),
                            nonce,
                        };
                        let score = solution_score(solution.address, target.block, &solution.nonce);
                        info!(
                            "{}: found nonce {} for block {} (score {}, work {})",
                            self.name,
                            solution.nonce_str(),
                            target.block,
                            score,
                            target.work
                        );
                        pb.println(format!("submitting solution for block {}", target.block));

                        if state.report_solution(solution) {
                            pb.println(format!("block {} solved", target.block));
                        } else {
                            pb.println(format!("solution for block {} rejected", target.block));
                        }
                    } else {
                        debug!("{}: discarding stale solution", self.name);
                    }

                    break;
                }

                offset += batch;
            }
        }

        Ok(())
    }
}
