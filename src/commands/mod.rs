pub(crate) mod remote;
pub(crate) mod server;
