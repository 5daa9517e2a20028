//! The boards and configs shipped in the Microkit SDK.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;

use super::{BoardDescriptor, ConfigDescriptor, KernelOptions, OptionValue, TargetCatalog};

fn options(pairs: &[(&str, OptionValue)]) -> KernelOptions {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

/// Options every supported board shares, plus the board's platform ones.
fn aarch64_mcs(platform: &[(&str, OptionValue)]) -> KernelOptions {
    let mut opts = options(platform);
    opts.insert("KernelIsMCS".into(), true.into());
    opts.insert("KernelArmExportPCNTUser".into(), true.into());
    opts
}

fn board(
    name: &str,
    gcc_cpu: &str,
    loader_link_address: u64,
    kernel_options: KernelOptions,
    example: &str,
) -> BoardDescriptor {
    let mut examples = BTreeMap::new();
    examples.insert(
        example.to_string(),
        PathBuf::from("example").join(name).join(example),
    );
    BoardDescriptor {
        name: name.into(),
        gcc_cpu: gcc_cpu.into(),
        loader_link_address,
        kernel_options,
        examples,
    }
}

pub fn boards() -> Vec<BoardDescriptor> {
    vec![
        board(
            "tqma8xqp1gb",
            "cortex-a35",
            0x8028_0000,
            aarch64_mcs(&[("KernelPlatform", "tqma8xqp1gb".into())]),
            "ethernet",
        ),
        board(
            "zcu102",
            "cortex-a53",
            0x4000_0000,
            aarch64_mcs(&[
                ("KernelPlatform", "zynqmp".into()),
                ("KernelARMPlatform", "zcu102".into()),
            ]),
            "hello",
        ),
        board(
            "maaxboard",
            "cortex-a53",
            0x4048_0000,
            aarch64_mcs(&[("KernelPlatform", "maaxboard".into())]),
            "hello",
        ),
        board(
            "imx8mm_evk",
            "cortex-a53",
            0x4100_0000,
            aarch64_mcs(&[("KernelPlatform", "imx8mm-evk".into())]),
            "passive_server",
        ),
        board(
            "imx8mq_evk",
            "cortex-a53",
            0x4100_0000,
            aarch64_mcs(&[("KernelPlatform", "imx8mq-evk".into())]),
            "hello",
        ),
        board(
            "odroidc2",
            "cortex-a53",
            0x2000_0000,
            aarch64_mcs(&[("KernelPlatform", "odroidc2".into())]),
            "hello",
        ),
        board(
            "odroidc4",
            "cortex-a55",
            0x2000_0000,
            aarch64_mcs(&[("KernelPlatform", "odroidc4".into())]),
            "timer",
        ),
        board(
            "qemu_virt_aarch64",
            "cortex-a53",
            0x7000_0000,
            aarch64_mcs(&[
                ("KernelPlatform", "qemu-arm-virt".into()),
                ("QEMU_MEMORY", "2048".into()),
            ]),
            "hello",
        ),
    ]
}

pub fn configs() -> Vec<ConfigDescriptor> {
    vec![
        ConfigDescriptor {
            name: "release".into(),
            debug: false,
            kernel_options: KernelOptions::new(),
        },
        ConfigDescriptor {
            name: "debug".into(),
            debug: true,
            kernel_options: options(&[
                ("KernelDebugBuild", true.into()),
                ("KernelPrinting", true.into()),
                ("KernelVerificationBuild", false.into()),
            ]),
        },
    ]
}

/// The default catalog used when no `--catalog` file is given.
pub fn catalog() -> Result<TargetCatalog> {
    TargetCatalog::new(boards(), configs())
}
