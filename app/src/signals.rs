use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

const POLL: Duration = Duration::from_millis(50);

#[derive(Clone)]
pub struct ExitSignal {
    flag: Arc<AtomicBool>,
}

impl ExitSignal {
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)) }
    }

    #[inline]
    pub fn request_exit(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_exit_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub fn install_ctrlc_handler(&self) -> anyhow::Result<()> {
        let s = self.clone();
        ctrlc::set_handler(move || s.request_exit())?;
        Ok(())
    }

    /// Blocks until exit is requested or `deadline` passes.
    /// Returns true if exit was requested.
    pub fn wait(&self, deadline: Option<Instant>) -> bool {
        loop {
            if self.is_exit_requested() {
                return true;
            }
            let nap = match deadline {
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        return false;
                    }
                    (at - now).min(POLL)
                }
                None => POLL,
            };
            thread::sleep(nap);
        }
    }
}

impl Default for ExitSignal {
    fn default() -> Self {
        Self::new()
    }
}
