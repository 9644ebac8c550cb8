mod descriptor;
mod store;

pub use descriptor::StyleDescriptor;
pub use store::{CatalogSource, StyleCatalog};
