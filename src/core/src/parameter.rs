//! jail(8) parameter vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{JailError, Result};

macro_rules! jail_parameters {
    ($($variant:ident => $name:literal,)+) => {
        /// A parameter understood by jail(8).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum JailParameter {
            $($variant,)+
        }

        impl JailParameter {
            pub const ALL: &'static [JailParameter] = &[$(JailParameter::$variant,)+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(JailParameter::$variant => $name,)+
                }
            }
        }

        impl FromStr for JailParameter {
            type Err = JailError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok(JailParameter::$variant),)+
                    _ => Err(JailError::Parse(format!("unknown jail parameter: '{}'", s))),
                }
            }
        }
    };
}

jail_parameters! {
    Path => "path",
    Ip4Addr => "ip4.addr",
    Ip4SaddrSel => "ip4.saddrsel",
    Ip4 => "ip4",
    Ip6Addr => "ip6.addr",
    Ip6SaddrSel => "ip6.saddrsel",
    Ip6 => "ip6",
    Vnet => "vnet",
    Hostname => "host.hostname",
    Host => "host",
    Securelevel => "securelevel",
    DevfsRuleset => "devfs_ruleset",
    ChildrenMax => "children.max",
    ChildrenCur => "children.cur",
    EnforceStatfs => "enforce_statfs",
    Persist => "persist",
    CpusetId => "cpuset.id",
    Dying => "dying",
    Parent => "parent",
    OsRelease => "osrelease",
    OsRelDate => "osreldate",
    AllowSetHostname => "allow.set_hostname",
    AllowSysvipc => "allow.sysvipc",
    AllowRawSockets => "allow.raw_sockets",
    AllowChflags => "allow.chflags",
    AllowMount => "allow.mount",
    AllowMountDevfs => "allow.mount.devfs",
    AllowQuotas => "allow.quotas",
    AllowReadMsgbuf => "allow.read_msgbuf",
    AllowSocketAf => "allow.socket_af",
    AllowMlock => "allow.mlock",
    AllowReservedPorts => "allow.reserved_ports",
    AllowMountFdescfs => "allow.mount.fdescfs",
    AllowMountFusefs => "allow.mount.fusefs",
    AllowMountNullfs => "allow.mount.nullfs",
    AllowMountProcfs => "allow.mount.procfs",
    AllowMountLinprocfs => "allow.mount.linprocfs",
    AllowMountLinsysfs => "allow.mount.linsysfs",
    AllowMountTmpfs => "allow.mount.tmpfs",
    AllowMountZfs => "allow.mount.zfs",
    AllowVmm => "allow.vmm",
    Linux => "linux",
    LinuxOsname => "linux.osname",
    LinuxOsrelease => "linux.osrelease",
    LinuxOssVersion => "linux.oss_version",
    Sysvmsg => "sysvmsg",
    Sysvsem => "sysvsem",
    Sysvshm => "sysvshm",
    ExecPrestart => "exec.prestart",
    ExecCreated => "exec.created",
    ExecStart => "exec.start",
    Command => "command",
    ExecPoststart => "exec.poststart",
    ExecPrestop => "exec.prestop",
    ExecStop => "exec.stop",
    ExecPoststop => "exec.poststop",
    ExecClean => "exec.clean",
    ExecJailUser => "exec.jail_user",
    ExecSystemJailUser => "exec.system_jail_user",
    ExecSystemUser => "exec.system_user",
    ExecTimeout => "exec.timeout",
    ExecConsolelog => "exec.consolelog",
    ExecFib => "exec.fib",
    StopTimeout => "stop.timeout",
    Interface => "interface",
    VnetInterface => "vnet.interface",
    IpHostname => "ip_hostname",
    Mount => "mount",
    MountFstab => "mount.fstab",
    MountDevfs => "mount.devfs",
    MountFdescfs => "mount.fdescfs",
    MountProcfs => "mount.procfs",
    AllowDying => "allow.dying",
    Depend => "depend",
}

impl fmt::Display for JailParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for JailParameter {
    type Error = JailError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<JailParameter> for String {
    fn from(parameter: JailParameter) -> Self {
        parameter.as_str().to_string()
    }
}
