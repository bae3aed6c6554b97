//! Units the image enables and masks during prebuild

/// Units enabled at prebuild
pub const ENABLE: &[&str] = &[
    "systemd-networkd.service",
    "systemd-resolved.service",
    "ssh.service",
    "pcss.service",
];

/// Units that make no sense inside a container and are masked for good
pub const MASK: &[&str] = &[
    "getty.target",
    "console-getty.service",
    "systemd-firstboot.service",
    "systemd-remount-fs.service",
    "sys-kernel-config.mount",
    "sys-kernel-debug.mount",
    "sys-kernel-tracing.mount",
    "systemd-timesyncd.service",
];

/// Pair of unit lists applied by prebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitPlan<'a> {
    pub enable: &'a [&'a str],
    pub mask: &'a [&'a str],
}

/// The compiled-in plan
pub const PLAN: UnitPlan<'static> = UnitPlan {
    enable: ENABLE,
    mask: MASK,
};
