pub mod model;
pub mod pipeline;
pub mod registry;
pub mod remote;
#[cfg(feature = "torch")]
pub mod torch;

#[cfg(test)]
pub mod testing;
