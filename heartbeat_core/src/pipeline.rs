use anyhow::anyhow;

use crate::handler::TickHandler;

/// One collaborator driven by the tick (movement, quests, persistence flush...).
pub trait TickSystem: Send {
    fn id(&self) -> &'static str;

    fn run(&mut self) -> anyhow::Result<()>;
}

/// Composes systems into the single handler the scheduler accepts.
///
/// Systems run in registration order. A failing system does not keep later
/// systems from running in the same tick; the tick reports the failures
/// together.
pub struct TickPipeline {
    systems: Vec<Box<dyn TickSystem>>,
}

impl TickPipeline {
    pub fn new() -> Self {
        Self { systems: Vec::new() }
    }

    pub fn add<S: TickSystem + 'static>(&mut self, system: S) -> &mut Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.systems.iter().map(|s| s.id()).collect()
    }
}

impl Default for TickPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl TickHandler for TickPipeline {
    fn on_tick(&mut self) -> anyhow::Result<()> {
        let mut failed: Vec<String> = Vec::new();

        for s in self.systems.iter_mut() {
            if let Err(e) = s.run() {
                failed.push(format!("{}: {e:#}", s.id()));
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("{} system(s) failed: {}", failed.len(), failed.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct Recorder {
        id: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl TickSystem for Recorder {
        fn id(&self) -> &'static str {
            self.id
        }

        fn run(&mut self) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(self.id);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    fn recorder(id: &'static str, fail: bool, log: &Arc<Mutex<Vec<&'static str>>>) -> Recorder {
        Recorder { id, fail, log: log.clone() }
    }

    #[test]
    fn runs_systems_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut p = TickPipeline::new();
        p.add(recorder("input", false, &log))
            .add(recorder("movement", false, &log))
            .add(recorder("quests", false, &log));

        p.on_tick().unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["input", "movement", "quests"]);
        assert_eq!(p.ids(), vec!["input", "movement", "quests"]);
    }

    #[test]
    fn failure_does_not_skip_later_systems() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut p = TickPipeline::new();
        p.add(recorder("rewards", true, &log)).add(recorder("ranking", false, &log));

        let err = p.on_tick().unwrap_err();
        assert!(err.to_string().contains("rewards: boom"));
        assert_eq!(*log.lock().unwrap(), vec!["rewards", "ranking"]);
    }
}
