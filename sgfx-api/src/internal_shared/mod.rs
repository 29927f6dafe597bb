mod backend;
pub(crate) use backend::SgfxBackend;

mod replay;
pub(crate) use replay::*;

mod resource_tables;
pub use resource_tables::SgfxLiveResources;
pub(crate) use resource_tables::*;

mod validation;
pub use validation::SgfxActiveRenderPass;
pub(crate) use validation::*;
