#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

#[doc(inline)]
pub use bonevoid_volume as volume;

#[doc(inline)]
pub use bonevoid_imgproc as imgproc;

#[doc(inline)]
pub use bonevoid_detect as detect;
