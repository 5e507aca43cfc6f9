use serde::Deserialize;

pub const DEFAULT_NETWORK: &str = "default";

/// Frozen snapshot of the physical machine being described.  Built by the
/// caller (or deserialized from the settings file) and never mutated during
/// generation.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Machine {
    pub guestname: String,
    /// Memory in bytes; reported in the document as KiB.
    pub memory: u64,
    pub vcpus: u32,
    #[serde(default)]
    pub cpu: Cpu,
    #[serde(default)]
    pub rtc: Rtc,
    /// Fixed disks, in order.  Either absolute block-device paths or short
    /// device-name hints.
    #[serde(default)]
    pub disks: Vec<String>,
    /// Removable media device names (CD-ROMs and the like).
    #[serde(default)]
    pub removable: Vec<String>,
    /// Host network interface names.
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Interface-to-network mappings, `"IFACE:NETWORK"` or a bare
    /// `"NETWORK"` catch-all.  Empty means everything maps to
    /// [`DEFAULT_NETWORK`].
    #[serde(default)]
    pub network_map: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Cpu {
    pub vendor: Option<String>,
    pub model: Option<String>,
    /// Topology counts; 0 means unspecified.
    #[serde(default)]
    pub sockets: u32,
    #[serde(default)]
    pub cores: u32,
    #[serde(default)]
    pub threads: u32,
    #[serde(default)]
    pub acpi: bool,
    #[serde(default)]
    pub apic: bool,
    #[serde(default)]
    pub pae: bool,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Rtc {
    #[serde(default)]
    pub basis: RtcBasis,
    /// Seconds of drift from the basis; only meaningful for [`RtcBasis::Utc`].
    #[serde(default)]
    pub offset: i32,
}

#[derive(Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RtcBasis {
    #[default]
    Unknown,
    Utc,
    Localtime,
}

/// Established data transport for one disk.  Only the remote NBD port is
/// consumed here; the rest of the connection lives with its owner.
#[derive(Deserialize, Debug, Clone, Copy)]
pub struct DataConn {
    pub nbd_remote_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    const SNAPSHOT: &str = r#"
        [machine]
        guestname = "phys1"
        memory = 2147483648
        vcpus = 4
        disks = ["/dev/sda", "vdb"]
        interfaces = ["eth0"]
        network_map = ["eth0:prod"]

        [machine.cpu]
        model = "Haswell"
        sockets = 2
        acpi = true

        [machine.rtc]
        basis = "utc"
        offset = -7
    "#;

    fn load(toml: &str) -> Machine {
        let settings = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap();
        settings.get("machine").unwrap()
    }

    #[test]
    fn snapshot_deserializes() {
        let m = load(SNAPSHOT);
        assert_eq!(m.guestname, "phys1");
        assert_eq!(m.memory, 2 * 1024 * 1024 * 1024);
        assert_eq!(m.vcpus, 4);
        assert_eq!(m.disks, vec!["/dev/sda", "vdb"]);
        assert_eq!(m.cpu.model.as_deref(), Some("Haswell"));
        assert_eq!(m.cpu.vendor, None);
        assert_eq!(m.cpu.sockets, 2);
        assert_eq!(m.cpu.cores, 0);
        assert!(m.cpu.acpi);
        assert!(!m.cpu.pae);
        assert_eq!(m.rtc.basis, RtcBasis::Utc);
        assert_eq!(m.rtc.offset, -7);
    }

    #[test]
    fn optional_sections_default() {
        let m = load(
            r#"
            [machine]
            guestname = "bare"
            memory = 1048576
            vcpus = 1
            disks = ["/dev/sda"]
        "#,
        );
        assert_eq!(m.rtc.basis, RtcBasis::Unknown);
        assert_eq!(m.rtc.offset, 0);
        assert!(m.removable.is_empty());
        assert!(m.interfaces.is_empty());
        assert!(m.network_map.is_empty());
        assert_eq!(m.cpu.model, None);
    }
}
