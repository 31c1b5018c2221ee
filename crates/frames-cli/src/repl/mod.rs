//! REPL (Read-Eval-Print Loop) for framed classes
//!
//! This module wraps a [`DynamicRuntime`] with an interactive shell:
//! - Declarations typed at the prompt or loaded from files
//! - Instances bound to names
//! - Frames opened, entered, committed and discarded by hand
//! - Record chain inspection and collection

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use frames_core::dynamic::{DynamicInstance, DynamicRuntime, Value};
use frames_core::parser::load_module;
use frames_core::runtime::{Frame, FrameManager, Generation};
use frames_core::{FramesConfig, TransformationSummary};
use tracing::debug;

pub mod commands;
pub mod notifier;

pub use commands::ReplCommand;
pub use notifier::{BufferNotifier, DefaultNotifier, ReplNotifier};

/// Interactive shell over one frame manager
pub struct Repl {
    runtime: DynamicRuntime,
    /// Current notifier for output
    notifier: Arc<dyn ReplNotifier>,
    /// Frames this session opened and has not closed yet
    frames: BTreeMap<Generation, Frame>,
    /// Frame that `.get`, `.set` and `.new` run in
    active: Option<Generation>,
    instances: BTreeMap<String, Arc<DynamicInstance>>,
    /// Whether the REPL is running
    running: bool,
    /// Quiet mode (suppress timing info)
    quiet: bool,
}

impl Repl {
    pub fn new(config: FramesConfig) -> Self {
        Self {
            runtime: DynamicRuntime::new(FrameManager::new(config)),
            notifier: Arc::new(DefaultNotifier::new()),
            frames: BTreeMap::new(),
            active: None,
            instances: BTreeMap::new(),
            running: true,
            quiet: false,
        }
    }

    /// Set the notifier for this REPL
    pub fn set_notifier(&mut self, notifier: Arc<dyn ReplNotifier>) {
        self.notifier = notifier;
    }

    /// Get a reference to the current notifier
    pub fn notifier(&self) -> &dyn ReplNotifier {
        self.notifier.as_ref()
    }

    pub fn runtime(&self) -> &DynamicRuntime {
        &self.runtime
    }

    fn manager(&self) -> &Arc<FrameManager> {
        self.runtime.manager()
    }

    /// Check if the REPL is still running
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Set quiet mode
    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    pub fn active_frame(&self) -> Option<&Frame> {
        self.active.and_then(|generation| self.frames.get(&generation))
    }

    pub fn instance(&self, var: &str) -> Result<&Arc<DynamicInstance>> {
        self.instances
            .get(var)
            .ok_or_else(|| anyhow!("No instance named '{var}'; bind one with .new"))
    }

    /// Parse REPL input into a command
    pub fn parse_input(&self, input: &str) -> Result<ReplCommand> {
        commands::parse_command(input)
    }

    /// Parse and run one line, reporting through the notifier
    pub fn execute_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            return;
        }
        let start = Instant::now();
        match self.parse_input(trimmed).and_then(|command| self.handle_command(command)) {
            Ok(output) => {
                let duration = start.elapsed().as_micros() as u64;
                self.notifier.on_result(&output, duration, self.quiet);
            }
            Err(e) => self.notifier.on_error(&format!("Error: {e:#}")),
        }
    }

    /// Handle a REPL command
    pub fn handle_command(&mut self, command: ReplCommand) -> Result<String> {
        debug!(?command, "repl command");
        match command {
            ReplCommand::Help => Ok(help_text().to_string()),
            ReplCommand::Quit => {
                self.running = false;
                Ok("Goodbye!".to_string())
            }
            ReplCommand::Quiet => {
                self.quiet = !self.quiet;
                Ok(format!("Quiet mode: {}", if self.quiet { "on" } else { "off" }))
            }
            ReplCommand::Load(path) => {
                let module = load_module(Path::new(&path))?;
                let summary = self.runtime.load_declarations(module)?;
                Ok(format!("Loaded {path}: {}", describe_summary(&summary)))
            }
            ReplCommand::Declare(source) => {
                let summary = self.runtime.load_source(&source)?;
                Ok(describe_summary(&summary))
            }
            ReplCommand::New { var, class, args } => self.new_instance(var, &class, &args),
            ReplCommand::Open(None) => self.open_frame(),
            ReplCommand::Open(Some(generation)) => {
                let generation = Generation(generation);
                if !self.frames.contains_key(&generation) {
                    bail!("No open frame {generation}");
                }
                self.active = Some(generation);
                Ok(format!("Frame {generation} is active"))
            }
            ReplCommand::Commit(target) => self.commit_frame(target),
            ReplCommand::Discard(target) => {
                let (generation, frame) = self.take_frame(target)?;
                frame.discard();
                Ok(format!("Discarded frame {generation}"))
            }
            ReplCommand::Get { var, property } => self.get(&var, property.as_deref()),
            ReplCommand::Set { var, property, value } => {
                let instance = Arc::clone(self.instance(&var)?);
                let value = Value::parse(&value)?;
                let shown = value.to_string();
                self.in_active_frame(|| instance.set(&property, value))?;
                Ok(format!("{var}.{property} = {shown}"))
            }
            ReplCommand::Frames => Ok(self.describe_frames()),
            ReplCommand::Chain(var) => self.describe_chain(&var),
            ReplCommand::Gc => {
                let mut trimmed = 0;
                for instance in self.instances.values() {
                    let mut current = Some(instance.as_ref());
                    while let Some(instance) = current {
                        if let Some(state) = instance.framed_state() {
                            trimmed += self.manager().collect(state);
                        }
                        current = instance.base();
                    }
                }
                Ok(format!("Trimmed {trimmed} records"))
            }
            ReplCommand::Classes => Ok(self.describe_classes()),
        }
    }

    /// Run `body` inside the active frame, or outside any frame
    fn in_active_frame<T>(&self, body: impl FnOnce() -> T) -> T {
        match self.active_frame() {
            Some(frame) => frame.enter(body),
            None => body(),
        }
    }

    fn new_instance(&mut self, var: String, class: &str, args: &[String]) -> Result<String> {
        let args = args
            .iter()
            .map(|arg| Value::parse(arg))
            .collect::<frames_core::Result<Vec<_>>>()?;
        let instance = self.in_active_frame(|| self.runtime.instantiate(class, &args))?;
        let output = match instance.id() {
            Some(id) => format!("{var} = {class} {id}"),
            None => format!("{var} = {class}"),
        };
        self.instances.insert(var, instance);
        Ok(output)
    }

    fn open_frame(&mut self) -> Result<String> {
        let frame = self.manager().open()?;
        let generation = frame.generation();
        let invalid: Vec<String> = frame.invalid().iter().map(|g| g.to_string()).collect();
        self.frames.insert(generation, frame);
        self.active = Some(generation);
        if invalid.is_empty() {
            Ok(format!("Opened frame {generation}"))
        } else {
            Ok(format!("Opened frame {generation} (not seeing {})", invalid.join(", ")))
        }
    }

    fn take_frame(&mut self, target: Option<u64>) -> Result<(Generation, Frame)> {
        let generation = match target {
            Some(generation) => Generation(generation),
            None => self
                .active
                .ok_or_else(|| anyhow!("No active frame; open one with .open"))?,
        };
        let frame = self
            .frames
            .remove(&generation)
            .ok_or_else(|| anyhow!("No open frame {generation}"))?;
        if self.active == Some(generation) {
            self.active = None;
        }
        Ok((generation, frame))
    }

    fn commit_frame(&mut self, target: Option<u64>) -> Result<String> {
        let (generation, frame) = self.take_frame(target)?;
        let event = frame.commit()?;
        let mut output = format!("Committed frame {generation}: {} changed", event.changed.len());
        if !event.merged.is_empty() {
            output.push_str(&format!(", {} merged", event.merged.len()));
        }
        Ok(output)
    }

    fn get(&self, var: &str, property: Option<&str>) -> Result<String> {
        let instance = self.instance(var)?;
        match property {
            Some(property) => {
                let value = self.in_active_frame(|| instance.get(property))?;
                Ok(value.to_string())
            }
            None => {
                let properties = self.in_active_frame(|| instance.properties())?;
                Ok(properties
                    .iter()
                    .map(|(name, value)| format!("{name} = {value}"))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
        }
    }

    fn describe_frames(&self) -> String {
        let mut lines: Vec<String> = self
            .frames
            .iter()
            .map(|(generation, frame)| {
                let marker = if self.active == Some(*generation) { "*" } else { " " };
                let touched = frame.touched_objects().len();
                format!("{marker} {generation}  {:?}  wrote {touched}", frame.state())
            })
            .collect();
        if lines.is_empty() {
            lines.push("No open frames".to_string());
        }
        let stats = self.manager().stats();
        lines.push(format!(
            "opened {}, committed {}, discarded {}, conflicts {}, merged {}, trimmed {}",
            stats.opened,
            stats.committed,
            stats.discarded,
            stats.conflicts,
            stats.merged,
            stats.records_trimmed
        ));
        lines.join("\n")
    }

    fn describe_chain(&self, var: &str) -> Result<String> {
        let instance = self.instance(var)?;
        let Some(state) = instance.framed_state() else {
            bail!("{var} is a plain {} without a record chain", instance.class_name());
        };
        let chain = state.chain();
        let layout: Vec<&String> = instance.class().layout.keys().collect();

        let mut lines = vec![format!("{} {} ({} records)", chain.type_name(), chain.id(), chain.len())];
        for generation in chain.generations() {
            let Some(record) = chain.find(generation) else {
                continue;
            };
            let values = record.read();
            let fields: Vec<String> = layout
                .iter()
                .enumerate()
                .map(|(slot, name)| format!("{name} = {}", values.get(slot)))
                .collect();
            let base = record.base().map(|base| format!(" <- {base}")).unwrap_or_default();
            lines.push(format!("  {generation}{base}: {}", fields.join(", ")));
        }
        Ok(lines.join("\n"))
    }

    fn describe_classes(&self) -> String {
        let mut lines = Vec::new();
        for name in self.runtime.class_names() {
            if let Some(class) = self.runtime.class(&name) {
                let kind = if class.is_framed() { "framed" } else { "plain" };
                lines.push(format!("class {name} ({kind})"));
            }
        }
        for (var, instance) in &self.instances {
            lines.push(format!("{var}: {}", instance.class_name()));
        }
        if lines.is_empty() {
            lines.push("Nothing loaded".to_string());
        }
        lines.join("\n")
    }

    /// Show exit statistics
    pub fn show_exit_stats(&self) {
        if !self.frames.is_empty() {
            self.notifier
                .on_output(&format!("Discarding {} open frames", self.frames.len()));
        }
        if !self.quiet {
            let stats = self.manager().stats();
            self.notifier.on_output(&format!(
                "\nSession complete: {} frames committed, {} discarded.",
                stats.committed, stats.discarded
            ));
        }
    }
}

fn describe_summary(summary: &TransformationSummary) -> String {
    format!(
        "{} classes, {} framed, {} properties framed",
        summary.classes_seen, summary.classes_transformed, summary.properties_framed
    )
}

fn help_text() -> &'static str {
    r#"framec REPL Commands:
  .help                     - Show this help message
  .quit                     - Exit the REPL
  .quiet                    - Toggle quiet mode (hide timing info)
  .load <file>              - Load a .frames or .json declaration file
  .classes                  - List loaded classes and bound instances

Instances:
  .new <var> <Class> [args] - Construct an instance (in the active frame, if any)
  .get <var> [property]     - Read one or every property
  .set <var> <prop> <value> - Write a property in the active frame
  .chain <var>              - Show the instance's record chain

Frames:
  .open [generation]        - Open a new frame, or reactivate an open one
  .commit [generation]      - Commit the active (or given) frame
  .discard [generation]     - Discard the active (or given) frame
  .frames                   - List open frames and runtime counters
  .gc                       - Trim stale records from every instance

Any other line is declaration source, e.g.
  @Framed class Counter { var count: Int = 0 }"#
}
