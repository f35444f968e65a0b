use crate::mode::ModeCommand;
use crate::rewind::RewindCommand;
use crate::time_scale::TimeScaleCommand;

/// Every command the kernel accepts. Commands are queued, consumed once by the
/// next update, then discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelCommand {
    TimeScale(TimeScaleCommand),
    Rewind(RewindCommand),
    Mode(ModeCommand),
    /// Queue single-tick steps while paused.
    StepTicks { count: u32 },
}

impl From<TimeScaleCommand> for KernelCommand {
    fn from(command: TimeScaleCommand) -> Self {
        Self::TimeScale(command)
    }
}

impl From<RewindCommand> for KernelCommand {
    fn from(command: RewindCommand) -> Self {
        Self::Rewind(command)
    }
}

impl From<ModeCommand> for KernelCommand {
    fn from(command: ModeCommand) -> Self {
        Self::Mode(command)
    }
}

/// FIFO of commands waiting for the next update.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: Vec<KernelCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: impl Into<KernelCommand>) {
        self.pending.push(command.into());
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every pending command in submission order.
    pub fn drain(&mut self) -> Vec<KernelCommand> {
        std::mem::take(&mut self.pending)
    }
}
