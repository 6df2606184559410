pub(crate) mod push;
pub(crate) mod stat;
