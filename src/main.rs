#[cfg(feature = "ndarray")]
mod ndarray {
    use bsgan::cli::{run, Cli};
    use burn::backend::{
        ndarray::{NdArray, NdArrayDevice},
        Autodiff,
    };

    pub fn launch(cli: Cli) -> bsgan::Result<()> {
        run::<Autodiff<NdArray>>(cli, NdArrayDevice::Cpu)
    }
}

#[cfg(feature = "tch-gpu")]
mod tch_gpu {
    use bsgan::cli::{run, Cli};
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };

    pub fn launch(cli: Cli) -> bsgan::Result<()> {
        #[cfg(not(target_os = "macos"))]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(target_os = "macos")]
        let device = LibTorchDevice::Mps;

        run::<Autodiff<LibTorch>>(cli, device)
    }
}

#[cfg(feature = "tch-cpu")]
mod tch_cpu {
    use bsgan::cli::{run, Cli};
    use burn::backend::{
        libtorch::{LibTorch, LibTorchDevice},
        Autodiff,
    };

    pub fn launch(cli: Cli) -> bsgan::Result<()> {
        run::<Autodiff<LibTorch>>(cli, LibTorchDevice::Cpu)
    }
}

#[cfg(feature = "wgpu")]
mod wgpu {
    use bsgan::cli::{run, Cli};
    use burn::backend::{
        wgpu::{Wgpu, WgpuDevice},
        Autodiff,
    };

    pub fn launch(cli: Cli) -> bsgan::Result<()> {
        run::<Autodiff<Wgpu>>(cli, WgpuDevice::default())
    }
}

#[cfg(not(any(
    feature = "ndarray",
    feature = "tch-cpu",
    feature = "tch-gpu",
    feature = "wgpu"
)))]
compile_error!("Enable one backend feature: ndarray, tch-cpu, tch-gpu or wgpu.");

use clap::Parser;

fn main() {
    let cli = bsgan::cli::Cli::parse();

    #[cfg(feature = "ndarray")]
    let result = ndarray::launch(cli);
    #[cfg(all(feature = "tch-cpu", not(feature = "ndarray")))]
    let result = tch_cpu::launch(cli);
    #[cfg(all(feature = "tch-gpu", not(feature = "ndarray"), not(feature = "tch-cpu")))]
    let result = tch_gpu::launch(cli);
    #[cfg(all(
        feature = "wgpu",
        not(feature = "ndarray"),
        not(feature = "tch-cpu"),
        not(feature = "tch-gpu")
    ))]
    let result = wgpu::launch(cli);

    if let Err(err) = result {
        log::error!("{err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
