//! One module per subcommand group. Every command returns `Err(message)`
//! for `main` to report; results go through [`crate::Printer`].

pub(crate) mod check;
pub(crate) mod evidence;
pub(crate) mod replay;
pub(crate) mod run;
pub(crate) mod snapshots;
