// Library for tests to access modules

pub mod bandwidth;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod port_bitmap;
pub mod routes;
pub mod uve_table;
pub mod vm_uve;
pub mod worker;
