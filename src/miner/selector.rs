//! OpenCL device discovery, listing and selection.

use super::{MinerConfig, MinerError};
use crate::ext::DeviceExt;
use ascii_tree::Tree;
use ocl::{Device, Platform};

/// A compatible device together with its stable selection token.
#[derive(Debug, Clone)]
pub struct MiningDevice {
    pub platform: Platform,
    pub device: Device,

    /// Stable id of the form `p<platform>d<device>`.
    pub token: String,

    pub name: String,
}

/// Enumerate compatible devices across every platform, in a stable order.
///
/// Only GPU type devices are considered; everything else is far too slow to
/// be worth a kernel compile.
pub fn compatible_devices() -> Result<Vec<MiningDevice>, MinerError> {
    let mut pool = vec![];

    for (pi, platform) in Platform::list().into_iter().enumerate() {
        for (di, device) in Device::list_all(platform)?.into_iter().enumerate() {
            if !device.is_gpu()? {
                continue;
            }

            pool.push(MiningDevice {
                platform,
                device,
                token: format!("p{}d{}", pi, di),
                name: device.human_name()?,
            });
        }
    }

    Ok(pool)
}

/// Render the device tree shown by `--list-devices`.
pub fn device_tree() -> Result<Tree, MinerError> {
    let mut platforms = vec![];
    let mut n = 0usize;

    for (pi, platform) in Platform::list().into_iter().enumerate() {
        let mut leaves = vec![];

        for (di, device) in Device::list_all(platform)?.into_iter().enumerate() {
            if !device.is_gpu()? {
                continue;
            }

            leaves.push(Tree::Leaf(vec![
                format!(
                    "#{}: {} [--device p{}d{}]",
                    n,
                    device.human_name()?,
                    pi,
                    di
                ),
                format!("Compute units: {}", device.compute_units()?),
                format!("Max clock frequency: {} MHz", device.clock_frequency()?),
                format!("Preferred vector width: {}", device.preferred_vecsize()?),
            ]));
            n += 1;
        }

        if !leaves.is_empty() {
            platforms.push(Tree::Node(format!("Platform {}", platform.name()?), leaves));
        }
    }

    Ok(Tree::Node("OpenCL devices".to_owned(), platforms))
}

/// Resolve the configured selection flags against the device pool.
pub fn select(cfg: &MinerConfig) -> Result<Vec<MiningDevice>, MinerError> {
    let pool = compatible_devices()?;

    if pool.is_empty() {
        return Err(MinerError::NoDevices);
    }

    if cfg.all_devices {
        return Ok(pool);
    }

    fn push(entry: &MiningDevice, selected: &mut Vec<MiningDevice>) {
        if !selected.iter().any(|s| s.token == entry.token) {
            selected.push(entry.clone());
        }
    }

    let mut selected: Vec<MiningDevice> = vec![];

    for id in &cfg.device_ids {
        match pool.iter().find(|d| &d.token == id) {
            Some(entry) => push(entry, &mut selected),
            None => return Err(MinerError::UnknownDevice(id.clone())),
        }
    }

    for &num in &cfg.device_nums {
        match pool.get(num) {
            Some(entry) => push(entry, &mut selected),
            None => return Err(MinerError::UnknownDeviceNumber(num)),
        }
    }

    if cfg.best_device || selected.is_empty() {
        let mut best: Option<(&MiningDevice, u64)> = None;

        for entry in &pool {
            let score = entry.device.mining_score()?;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((entry, score));
            }
        }

        if let Some((entry, _)) = best {
            push(entry, &mut selected);
        }
    }

    Ok(selected)
}
