// LiquidEther - GPU Fluid Background Effect
// Copyright (c) 2025 Filipe da Veiga Ventura Alves
// Licensed under MIT License

/// Errors raised by the engine and its GPU backend.
///
/// Construction failures are fatal: there is no degraded rendering mode,
/// the caller is expected to skip the effect entirely.
#[derive(Debug, thiserror::Error)]
pub enum EtherError {
    #[error("no compatible GPU adapter available")]
    NoAdapter,

    #[error("GPU device request failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("surface creation failed: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("surface is not supported by the selected adapter")]
    SurfaceUnsupported,

    #[error("adapter lacks a required capability: {0}")]
    MissingCapability(&'static str),

    #[error("shader compilation failed: {shader}: {message}")]
    ShaderCompilation { shader: String, message: String },

    #[error("GPU fault during frame: {message}")]
    GpuFault { message: String },

    #[error("engine has been disposed")]
    Disposed,
}
