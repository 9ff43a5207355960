// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

//! Interactive fluid background: a stable-fluids solver driven by the
//! pointer or, when the user is idle, by a wandering virtual cursor.

pub mod auto_driver;
pub mod engine;
pub mod error;
pub mod fluid;
pub mod lifecycle;
pub mod output;
pub mod palette;
pub mod pointer;
pub mod settings;
pub mod viewport;

pub use engine::{FrameOutcome, LiquidEther};
pub use error::EtherError;
pub use fluid::cpu::CpuFields;
pub use fluid::gpu::GpuFields;
pub use settings::EtherSettings;
pub use viewport::ContainerRect;
