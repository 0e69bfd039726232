use ocl::enums::{DeviceInfo, DeviceInfoResult};
use ocl::error::Result as OclResult;
use ocl::flags::DeviceType;
use ocl::Device;

/// Extra accessors over [`ocl::Device`] used for selection and kernel setup.
pub trait DeviceExt {
    fn human_name(&self) -> OclResult<String>;

    /// Preferred SIMD width, clamped to the widths the kernel supports.
    fn preferred_vecsize(&self) -> OclResult<u8>;

    /// Default global work size: the product of the maximum work-item sizes.
    fn default_worksize(&self) -> OclResult<usize>;

    /// Relative selection score, higher is better.
    fn mining_score(&self) -> OclResult<u64>;

    fn compute_units(&self) -> OclResult<u32>;

    fn clock_frequency(&self) -> OclResult<u32>;

    fn is_gpu(&self) -> OclResult<bool>;

    fn has_extension(&self, name: &str) -> OclResult<bool>;
}

impl DeviceExt for Device {
    fn human_name(&self) -> OclResult<String> {
        Ok(self.name()?.trim().to_owned())
    }

    fn preferred_vecsize(&self) -> OclResult<u8> {
        match self.info(DeviceInfo::PreferredVectorWidthChar)? {
            DeviceInfoResult::PreferredVectorWidthChar(w) if w >= 4 => Ok(4),
            DeviceInfoResult::PreferredVectorWidthChar(w) if w >= 2 => Ok(2),
            _ => Ok(1),
        }
    }

    fn default_worksize(&self) -> OclResult<usize> {
        match self.info(DeviceInfo::MaxWorkItemSizes)? {
            DeviceInfoResult::MaxWorkItemSizes(sizes) => {
                Ok(sizes.iter().product::<usize>().max(1))
            }
            _ => Ok(1),
        }
    }

    fn mining_score(&self) -> OclResult<u64> {
        Ok(self.compute_units()? as u64 * self.clock_frequency()? as u64)
    }

    fn compute_units(&self) -> OclResult<u32> {
        match self.info(DeviceInfo::MaxComputeUnits)? {
            DeviceInfoResult::MaxComputeUnits(units) => Ok(units),
            _ => Ok(0),
        }
    }

    fn clock_frequency(&self) -> OclResult<u32> {
        match self.info(DeviceInfo::MaxClockFrequency)? {
            DeviceInfoResult::MaxClockFrequency(mhz) => Ok(mhz),
            _ => Ok(0),
        }
    }

    fn is_gpu(&self) -> OclResult<bool> {
        match self.info(DeviceInfo::Type)? {
            DeviceInfoResult::Type(t) => Ok(t.contains(DeviceType::GPU)),
            _ => Ok(false),
        }
    }

    fn has_extension(&self, name: &str) -> OclResult<bool> {
        match self.info(DeviceInfo::Extensions)? {
            DeviceInfoResult::Extensions(extensions) => Ok(extensions.contains(name)),
            _ => Ok(false),
        }
    }
}
