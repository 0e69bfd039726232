//! Mining: shared coordination state, device discovery and the per device
//! batch loop driving the OpenCL kernel.

pub mod device;
pub mod selector;
pub mod state;

use crate::krist::address::Address;
use crate::krist::block::ShortHash;
use sha2::{Digest, Sha256};
use std::str::{self, FromStr};
use structopt::StructOpt;

/// SIMD width used by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorSize(pub u8);

impl From<VectorSize> for u8 {
    fn from(size: VectorSize) -> Self {
        size.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidVectorSize {
    #[error("{0} is not a valid vector size (expected 1, 2 or 4)")]
    OutOfRange(u8),

    #[error("invalid vector size: {0}")]
    NotANumber(#[from] std::num::ParseIntError),
}

impl FromStr for VectorSize {
    type Err = InvalidVectorSize;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match u8::from_str(s)? {
            v if [1, 2, 4].contains(&v) => Ok(VectorSize(v)),
            v => Err(InvalidVectorSize::OutOfRange(v)),
        }
    }
}

#[derive(Debug, Clone, StructOpt)]
pub struct MinerConfig {
    /// Mine with every compatible device
    #[structopt(long)]
    pub all_devices: bool,

    /// Mine with the highest scoring device (the default when no other
    /// selection is given)
    #[structopt(long)]
    pub best_device: bool,

    /// Mine with the device with this id from --list-devices; repeatable
    #[structopt(long = "device", name = "id", number_of_values = 1)]
    pub device_ids: Vec<String>,

    /// Mine with the device with this number from --list-devices; repeatable
    #[structopt(long = "device-num", name = "n", number_of_values = 1)]
    pub device_nums: Vec<usize>,

    /// Force a kernel vector size of 1, 2 or 4 instead of the device default
    #[structopt(long = "vector-size", name = "size")]
    pub vector_size: Option<VectorSize>,

    /// Fixed global work size per kernel launch instead of the device default
    #[structopt(long, name = "worksize")]
    pub worksize: Option<u32>,
}

/// The current mining assignment from the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target {
    pub work: u64,
    pub block: ShortHash,
}

/// A candidate nonce, ready for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solution {
    pub address: Address,
    pub nonce: [u8; Solution::NONCE_LENGTH],
}

impl Solution {
    /// Two prefix characters plus the ten byte nonce encoding.
    pub const NONCE_LENGTH: usize = 12;

    pub fn nonce_str(&self) -> &str {
        str::from_utf8(&self.nonce).expect("nonce is not ascii")
    }
}

/// Big endian score of the first six digest bytes. Lower beats the work
/// threshold sooner.
pub fn hash_score(digest: &[u8]) -> u64 {
    digest[..6]
        .iter()
        .enumerate()
        .map(|(i, &v)| (v as u64) << (40 - 8 * i))
        .sum()
}

/// Recompute the score of a submitted nonce on the host.
pub fn solution_score(address: Address, block: ShortHash, nonce: &[u8]) -> u64 {
    let mut preimage = Vec::with_capacity(34);
    preimage.extend_from_slice(address.as_bytes());
    preimage.extend_from_slice(block.into_hex().as_bytes());
    preimage.extend_from_slice(nonce);
    hash_score(&Sha256::digest(&preimage))
}

#[derive(Debug, thiserror::Error)]
pub enum MinerError {
    #[error("OpenCL error: {0}")]
    Ocl(String),

    #[error("kernel build failed:\n{0}")]
    Build(String),

    #[error("self-test failed on {device}: {message}")]
    SelfTest { device: String, message: String },

    #[error("no compatible OpenCL devices found")]
    NoDevices,

    #[error("unknown device id {0:?}")]
    UnknownDevice(String),

    #[error("device number {0} is out of range")]
    UnknownDeviceNumber(usize),
}

impl From<ocl::Error> for MinerError {
    fn from(e: ocl::Error) -> Self {
        MinerError::Ocl(e.to_string())
    }
}

impl MinerError {
    pub fn exit_code(&self) -> i32 {
        match self {
            MinerError::UnknownDevice(_) | MinerError::UnknownDeviceNumber(_) => 1,
            MinerError::Ocl(_) | MinerError::Build(_) | MinerError::NoDevices => 2,
            MinerError::SelfTest { .. } => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::krist::nonce;

    #[test]
    fn vector_size_parsing() {
        assert_eq!(VectorSize::from_str("1").unwrap(), VectorSize(1));
        assert_eq!(VectorSize::from_str("2").unwrap(), VectorSize(2));
        assert_eq!(VectorSize::from_str("4").unwrap(), VectorSize(4));
        assert!(VectorSize::from_str("3").is_err());
        assert!(VectorSize::from_str("8").is_err());
        assert!(VectorSize::from_str("x").is_err());
    }

    #[test]
    fn score_of_known_digest() {
        let digest: [u8; 32] = Sha256::digest(b"abc").into();
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(hash_score(&digest), 0xba7816bf8f01);
        assert_eq!(hash_score(&digest), 204_982_842_010_881);
    }

    #[test]
    fn solution_score_hashes_the_full_preimage() {
        let address = Address::from_str("k5ztameslf").unwrap();
        let block = ShortHash::from_str("000000000cad").unwrap();

        let mut nonce_bytes = [0u8; Solution::NONCE_LENGTH];
        nonce_bytes[..2].copy_from_slice(b"aa");
        nonce_bytes[2..].copy_from_slice(&nonce::encode(12345));

        let mut expected = Vec::new();
        expected.extend_from_slice(b"k5ztameslf");
        expected.extend_from_slice(b"000000000cad");
        expected.extend_from_slice(&nonce_bytes);
        assert_eq!(expected.len(), 34);

        assert_eq!(
            solution_score(address, block, &nonce_bytes),
            hash_score(&Sha256::digest(&expected))
        );
    }
}
