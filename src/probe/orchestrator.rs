//! Startup discovery and hook installation.
//!
//! `Probe::new` compiles the settings table once (patterns and descriptors
//! are checked there, so a bad configuration fails before anything is
//! hooked). `Probe::run` then walks the target: the primary module first,
//! then a key source, then every optional mode module. Missing modules and
//! symbols are normal and only skip the hook that needed them.

use crate::error::{DiscoveryKind, ProbeError, Result};
use crate::host::{HostEngine, Module, NativePointer};
use crate::probe::correlation::CorrelationContext;
use crate::probe::descriptor::ValidatedDescriptor;
use crate::probe::engine::{InterceptionEngine, InterceptionTarget};
use crate::probe::exports::find_export;
use crate::probe::pattern::PatternSet;
use crate::probe::resolver::find_module;
use crate::probe::sink::EventSink;
use crate::probe::stats::SessionStatistics;
use crate::settings::hooks::HookSpec;
use crate::settings::ProbeSettings;
use log::{debug, error, info, warn};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct CompiledHook {
    label: String,
    symbol: PatternSet,
    descriptor: Arc<ValidatedDescriptor>,
}

impl CompiledHook {
    fn compile(scope: &str, spec: &HookSpec, max_arguments: usize) -> Result<Self> {
        let label = format!("{}.{}", scope, spec.name);
        Ok(Self {
            symbol: PatternSet::compile(&spec.symbol)?,
            descriptor: Arc::new(spec.descriptor.validate(&label, max_arguments)?),
            label,
        })
    }
}

#[derive(Debug, Clone)]
struct CompiledKeySource {
    module: Option<PatternSet>,
    hook: CompiledHook,
}

#[derive(Debug, Clone)]
struct CompiledMode {
    id: String,
    modules: PatternSet,
    hooks: Vec<CompiledHook>,
}

/// A hook that is now live in the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledHook {
    pub label: String,
    pub module: String,
    pub symbol: String,
    pub address: NativePointer,
}

/// A lookup or installation that did not happen, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedHook {
    pub label: String,
    pub reason: String,
}

/// Outcome of `Probe::run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// The primary module, if it was loaded
    pub primary: Option<Module>,
    pub installed: Vec<InstalledHook>,
    pub skipped: Vec<SkippedHook>,
}

impl DiscoveryReport {
    pub fn is_hooked(&self, label: &str) -> bool {
        self.installed.iter().any(|hook| hook.label == label)
    }

    pub fn key_hooked(&self) -> bool {
        self.installed.iter().any(|hook| hook.label.starts_with("key."))
    }
}

/// One probe session: compiled settings plus the shared correlation context.
pub struct Probe {
    primary: PatternSet,
    key_sources: Vec<CompiledKeySource>,
    modes: Vec<CompiledMode>,
    max_capture_len: usize,
    context: Arc<CorrelationContext>,
    statistics: Arc<SessionStatistics>,
}

impl Probe {
    /// Compiles `settings`; fails on invalid patterns or descriptors.
    pub fn new(settings: &ProbeSettings, sink: Arc<dyn EventSink>) -> Result<Self> {
        let max_arguments = settings.max_arguments;

        let key_sources = settings
            .key_sources
            .iter()
            .map(|source| {
                Ok(CompiledKeySource {
                    module: source.module.as_deref().map(PatternSet::compile).transpose()?,
                    hook: CompiledHook::compile("key", &source.hook, max_arguments)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let modes = settings
            .modes
            .iter()
            .map(|mode| {
                let specs = mode.hooks.as_ref().unwrap_or(&settings.mode_hooks);
                Ok(CompiledMode {
                    id: mode.id.clone(),
                    modules: PatternSet::compile(&mode.modules)?,
                    hooks: specs
                        .iter()
                        .map(|spec| CompiledHook::compile(&mode.id, spec, max_arguments))
                        .collect::<Result<Vec<_>>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            primary: PatternSet::compile(&settings.primary_module)?,
            key_sources,
            modes,
            max_capture_len: settings.max_capture_len,
            context: Arc::new(CorrelationContext::new(settings.correlation_scope, sink)),
            statistics: Arc::new(SessionStatistics::new()),
        })
    }

    pub fn context(&self) -> &Arc<CorrelationContext> {
        &self.context
    }

    pub fn statistics(&self) -> &Arc<SessionStatistics> {
        &self.statistics
    }

    /// Discovers targets in `host` and installs every hook that resolves.
    ///
    /// Never fails: a missing primary module ends discovery with nothing
    /// installed, anything else missing only skips its own hook.
    pub fn run<H: HostEngine + ?Sized>(&self, host: &H) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();

        let Some(primary) = find_module(host, &self.primary) else {
            let failure = ProbeError::discovery(DiscoveryKind::Module, &self.primary);
            error!("[*] Cipher backend not found: {}", failure);
            report.skipped.push(SkippedHook {
                label: "primary".to_string(),
                reason: failure.to_string(),
            });
            return report;
        };
        info!("[*] Cipher backend {} found at {}", primary.name, primary.base);

        let engine = InterceptionEngine::new(
            host.memory(),
            self.max_capture_len,
            self.context.clone(),
            self.statistics.clone(),
        );

        self.hook_key(host, &engine, &primary, &mut report);
        self.hook_modes(host, &engine, &mut report);

        info!(
            "Discovery finished: {} hooks installed, {} skipped",
            report.installed.len(),
            report.skipped.len()
        );
        report.primary = Some(primary);
        report
    }

    fn hook_key<H: HostEngine + ?Sized>(
        &self,
        host: &H,
        engine: &InterceptionEngine,
        primary: &Module,
        report: &mut DiscoveryReport,
    ) {
        for source in &self.key_sources {
            let module = match &source.module {
                None => primary.clone(),
                Some(patterns) => match find_module(host, patterns) {
                    Some(module) => module,
                    None => {
                        debug!("Key source module {} is not loaded", patterns);
                        continue;
                    }
                },
            };

            match self.install(host, engine, &module, &source.hook, report) {
                Ok(true) => return,
                Ok(false) => debug!("{} exports no key setup symbol", module.name),
                Err(e) => warn!("{}", e),
            }
        }

        let failure = ProbeError::discovery(DiscoveryKind::Export, "any configured key source");
        warn!("Keys will not be captured: {}", failure);
        report.skipped.push(SkippedHook {
            label: "key".to_string(),
            reason: failure.to_string(),
        });
    }

    fn hook_modes<H: HostEngine + ?Sized>(
        &self,
        host: &H,
        engine: &InterceptionEngine,
        report: &mut DiscoveryReport,
    ) {
        for mode in &self.modes {
            let Some(module) = find_module(host, &mode.modules) else {
                debug!("Mode {} is not loaded", mode.id);
                report.skipped.push(SkippedHook {
                    label: mode.id.clone(),
                    reason: ProbeError::discovery(DiscoveryKind::Module, &mode.modules).to_string(),
                });
                continue;
            };

            for hook in &mode.hooks {
                match self.install(host, engine, &module, hook, report) {
                    Ok(true) => {}
                    Ok(false) => report.skipped.push(SkippedHook {
                        label: hook.label.clone(),
                        reason: ProbeError::discovery(DiscoveryKind::Export, &hook.symbol).to_string(),
                    }),
                    Err(e) => {
                        warn!("{}", e);
                        report.skipped.push(SkippedHook {
                            label: hook.label.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Resolves `hook` in `module` and attaches it. `Ok(false)` when the
    /// symbol is not exported.
    fn install<H: HostEngine + ?Sized>(
        &self,
        host: &H,
        engine: &InterceptionEngine,
        module: &Module,
        hook: &CompiledHook,
        report: &mut DiscoveryReport,
    ) -> Result<bool> {
        let Some(symbol) = find_export(host, module, &hook.symbol) else {
            return Ok(false);
        };

        let target = InterceptionTarget {
            label: hook.label.clone(),
            symbol,
            descriptor: hook.descriptor.clone(),
        };
        engine.attach(host, &target)?;

        report.installed.push(InstalledHook {
            label: target.label,
            module: module.name.clone(),
            symbol: target.symbol.name,
            address: target.symbol.address,
        });
        Ok(true)
    }
}
