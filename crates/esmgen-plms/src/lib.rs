//! esmgen-plms
//!
//! Client library for the ESM3 protein language model: hub loading,
//! sequence completion, structure prediction, and PDB output.
//!
//! ```shell
//! cargo run -p esmgen -- generate --prompt <SEQ>
//! cargo run -p esmgen --features metal -- generate --prompt <SEQ>
//! ```
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{Device, Result};

pub use esm3::api::{Esm3InferenceClient, GenerationConfig, GenerationError, Track};
pub use esm3::config::Esm3Config;
pub use esm3::model::ESM3;
pub use esm3::pretrained::{login, ESM3_OPEN_SMALL};
pub use esm3::protein::ESMProtein;
pub use esm3::tokenization::EsmSequenceTokenizer;

pub mod esm3;

pub fn device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if cuda_is_available() {
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        Ok(Device::new_metal(0)?)
    } else {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            println!("Running on CPU, to run on GPU(metal), build with `--features metal`");
        }
        #[cfg(not(all(target_os = "macos", target_arch = "aarch64")))]
        {
            println!("Running on CPU, to run on GPU, build with `--features cuda`");
        }
        Ok(Device::Cpu)
    }
}
