//! Scenario files: a target layout plus a call trace, replayed against a
//! `SimulatedProcess`.
//!
//! ```toml
//! [[modules]]
//! name = "_raw_aesni.pyd"
//! base = 0x7ff800000000
//! exports = [{ name = "AESNI_start_operation", offset = 0x1040 }]
//!
//! [[buffers]]
//! name = "key"
//! bytes = [0xaa, 0xbb, 0xcc]
//!
//! [[calls]]
//! symbol = "AESNI_start_operation"
//! args = [{ buffer = "key" }, { len = "key" }]
//! ```

use crate::error::{ProbeError, Result};
use crate::host::simulated::SimulatedProcess;
use crate::host::NativePointer;
use base64::{engine::general_purpose::STANDARD, Engine};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub modules: Vec<ScenarioModule>,
    #[serde(default)]
    pub buffers: Vec<ScenarioBuffer>,
    #[serde(default)]
    pub calls: Vec<ScenarioCall>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioModule {
    pub name: String,
    pub base: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub exports: Vec<ScenarioExport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioExport {
    pub name: String,
    /// Offset of the export from the module base
    pub offset: u64,
}

/// A named buffer mapped into the simulated address space. Exactly one of
/// `text`, `bytes` or `base64` must be given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioBuffer {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
}

impl ScenarioBuffer {
    pub fn contents(&self) -> Result<Vec<u8>> {
        match (&self.text, &self.bytes, &self.base64) {
            (Some(text), None, None) => Ok(text.as_bytes().to_vec()),
            (None, Some(bytes), None) => Ok(bytes.clone()),
            (None, None, Some(encoded)) => STANDARD.decode(encoded.trim()).map_err(|e| {
                ProbeError::Scenario(format!("buffer '{}' is not valid base64: {}", self.name, e))
            }),
            _ => Err(ProbeError::Scenario(format!(
                "buffer '{}' needs exactly one of text, bytes or base64",
                self.name
            ))),
        }
    }
}

/// One argument of a simulated call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioArg {
    /// Address of a named buffer
    Buffer(String),
    /// Byte length of a named buffer
    Len(String),
    /// A literal integer; negative values are passed as two's complement
    Int(i64),
    /// A literal address
    Ptr(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioCall {
    pub symbol: String,
    /// Target thread making the call. When absent the call is made as the
    /// replaying thread, whose id is at least `FIRST_IMPLICIT_THREAD_ID`, so
    /// explicit ids below it never share correlation state with it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<u64>,
    #[serde(default)]
    pub args: Vec<ScenarioArg>,
}

/// A scenario whose target has been built and whose buffers are mapped.
pub struct PreparedScenario {
    pub process: SimulatedProcess,
    buffers: HashMap<String, (NativePointer, usize)>,
}

impl PreparedScenario {
    /// Address and length of a named buffer.
    pub fn buffer(&self, name: &str) -> Option<(NativePointer, usize)> {
        self.buffers.get(name).copied()
    }

    fn resolve(&self, arg: &ScenarioArg) -> Result<u64> {
        let lookup = |name: &str| {
            self.buffer(name)
                .ok_or_else(|| ProbeError::Scenario(format!("unknown buffer '{}'", name)))
        };
        match arg {
            ScenarioArg::Buffer(name) => Ok(lookup(name)?.0 .0),
            ScenarioArg::Len(name) => Ok(lookup(name)?.1 as u64),
            ScenarioArg::Int(value) => Ok(*value as u64),
            ScenarioArg::Ptr(address) => Ok(*address),
        }
    }
}

impl Scenario {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Builds the simulated target and maps every buffer.
    pub fn prepare(&self) -> Result<PreparedScenario> {
        let mut process = SimulatedProcess::new();
        for module in &self.modules {
            let exports: Vec<(&str, u64)> = module
                .exports
                .iter()
                .map(|e| (e.name.as_str(), e.offset))
                .collect();
            process.add_module(&module.name, module.base, module.size, &exports);
        }

        let mut buffers = HashMap::new();
        for buffer in &self.buffers {
            let contents = buffer.contents()?;
            let length = contents.len();
            let address = process.alloc(contents)?;
            if buffers.insert(buffer.name.clone(), (address, length)).is_some() {
                return Err(ProbeError::Scenario(format!(
                    "buffer '{}' is defined twice",
                    buffer.name
                )));
            }
        }

        Ok(PreparedScenario { process, buffers })
    }

    /// Performs every call in order. Returns the number of calls made.
    pub fn replay(&self, prepared: &PreparedScenario) -> Result<usize> {
        for (index, call) in self.calls.iter().enumerate() {
            let args = call
                .args
                .iter()
                .map(|arg| prepared.resolve(arg))
                .collect::<Result<Vec<_>>>()?;

            let hooked = match call.thread {
                Some(thread) => prepared.process.call_on_thread(thread, &call.symbol, &args),
                None => prepared.process.call(&call.symbol, &args),
            }
            .map_err(|e| ProbeError::Scenario(format!("call #{} to {}: {}", index + 1, call.symbol, e)))?;

            debug!("Call #{} {} ran {} listeners", index + 1, call.symbol, hooked);
        }
        Ok(self.calls.len())
    }
}
