mod command;

pub(crate) use command::resolve_workdir;
pub use command::CommandStage;
