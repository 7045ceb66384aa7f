/// The per-tick callback boundary.
///
/// Called once per consumed tick, on the scheduler's thread, with no
/// arguments. An `Err` (or a panic) is reported and counted by the scheduler
/// but never stops it.
pub trait TickHandler {
    fn on_tick(&mut self) -> anyhow::Result<()>;
}

impl<F> TickHandler for F
where
    F: FnMut() -> anyhow::Result<()>,
{
    #[inline]
    fn on_tick(&mut self) -> anyhow::Result<()> {
        self()
    }
}
