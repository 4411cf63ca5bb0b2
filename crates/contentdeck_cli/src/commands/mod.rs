pub(crate) mod articles;
pub(crate) mod deploy;
pub(crate) mod items;
pub(crate) mod limits;
pub(crate) mod locks;
pub(crate) mod login;
pub(crate) mod media;
pub(crate) mod meta;
pub(crate) mod shared;
