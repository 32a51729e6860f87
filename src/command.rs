use crossbeam::channel::{Receiver, Sender};

/// Control messages for live playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    /// End playback; the current run fails with a sink error.
    Stop,
}

pub fn channel() -> (Sender<Command>, Receiver<Command>) {
    crossbeam::channel::unbounded()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackState {
    pub paused: bool,
    pub stopped: bool,
}

impl PlaybackState {
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Pause => self.paused = true,
            Command::Resume => self.paused = false,
            Command::Stop => self.stopped = true,
        }
    }

    /// Apply every command waiting on `commands` without blocking.
    pub fn poll(&mut self, commands: &Receiver<Command>) {
        while let Ok(command) = commands.try_recv() {
            self.apply(command);
        }
    }
}
