use core::cell::Cell;

/// Execution level: the priority ceiling a lock enforces while held.
///
/// Levels are totally ordered; `None` is ordinary thread context and `High`
/// blocks everything. A thread's current level is tracked per thread and
/// raised/restored by [`IplMutex`](super::IplMutex) acquisition and release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum Ipl {
    /// Ordinary thread context; sleeping is legal.
    None = 0,
    /// Soft-interrupt callbacks (timeouts, soft clock).
    Soft = 1,
    /// Network interrupt handlers.
    Net = 2,
    /// Memory-management interrupt paths.
    Vm = 3,
    /// Everything blocked.
    High = 4,
}

impl Ipl {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Ipl::None,
            1 => Ipl::Soft,
            2 => Ipl::Net,
            3 => Ipl::Vm,
            _ => Ipl::High,
        }
    }
}

thread_local! {
    static CURRENT: Cell<Ipl> = const { Cell::new(Ipl::None) };
}

/// Returns the calling thread's current execution level.
pub fn current_level() -> Ipl {
    CURRENT.with(Cell::get)
}

pub(crate) fn set_level(level: Ipl) {
    CURRENT.with(|cell| cell.set(level));
}
