//! Gapless streaming playback for small PCM16 fragments.
//!
//! ## Pipeline
//! 1. **Ingress** ([`ingress`]): the transport hands over base64 fragments.
//! 2. **Decode** ([`decode`]): PCM16 little-endian bytes become normalized `f32` samples.
//! 3. **Queue** ([`queue`]): fragments wait in arrival order.
//! 4. **Schedule** ([`scheduler`]): one drain task per session submits fragments back-to-back.
//! 5. **Output** ([`playback`]): a CPAL stream plays whatever the scheduler submitted.

pub mod config;
pub mod decode;
pub mod device;
pub mod ingress;
pub mod output_buffer;
pub mod playback;
pub mod queue;
pub mod scheduler;
pub mod sink;
pub mod status;
