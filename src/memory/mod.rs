//! Memory manager: huge-page DMA allocation, virtual-to-physical
//! translation, packet buffers, and the memory pool that ties them together.

pub mod buffer;
pub mod dma;
pub mod pagemap;
pub mod pool;
pub mod registry;

pub use buffer::PacketBuffer;
pub use dma::DmaRegion;
pub use pool::MemoryPool;
