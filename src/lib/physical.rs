//! Writes the physical machine description as a small libvirt-style XML
//! document.  The file is input for the conversion tool on the server, not
//! for a live hypervisor.

use crate::machine::{DataConn, Machine, RtcBasis, DEFAULT_NETWORK};
use crate::xml_writer::XmlWriter;
use anyhow::{bail, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Device names longer than this fall back to a generated "sd*" target.
const TARGET_DEV_MAX: usize = 63;

const NOTICE: &str = " NOTE!\n\
\n\
\x20 This XML is written by the p2v-xml front end for the conversion\n\
\x20 tool running on the server.  It is a minimal description of the\n\
\x20 physical machine.  If the conversion target is libvirt, the\n\
\x20 conversion tool produces the real domain XML itself, which has\n\
\x20 little in common with this file.\n\
\n\
\x20 TL;DR: do not try to load this XML into libvirt. ";

/// Write the XML description of `machine` to `filename`, overwriting any
/// existing file.  `data_conns` must carry one established NBD transport per
/// entry in `machine.disks`.
pub fn generate_physical_xml(
    machine: &Machine,
    data_conns: &[DataConn],
    filename: &Path,
) -> Result<()> {
    if data_conns.len() < machine.disks.len() {
        bail!(
            "{} disks but only {} data connections",
            machine.disks.len(),
            data_conns.len()
        );
    }
    let mut w = XmlWriter::create(filename)?;
    write_domain(&mut w, machine, data_conns)?;
    w.finish()?;
    debug!("wrote physical machine XML to {}", filename.display());
    Ok(())
}

fn write_domain<W: Write>(
    w: &mut XmlWriter<W>,
    machine: &Machine,
    data_conns: &[DataConn],
) -> Result<()> {
    let memkb = machine.memory / 1024;

    w.comment(&format!(
        " {} {} ",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    ))?;
    w.comment(NOTICE)?;

    w.element("domain", |w| {
        w.attribute("type", "physical")?;

        w.single_element("name", &machine.guestname)?;
        w.element("memory", |w| {
            w.attribute("unit", "KiB")?;
            w.text(memkb)
        })?;
        w.element("currentMemory", |w| {
            w.attribute("unit", "KiB")?;
            w.text(memkb)
        })?;
        w.single_element("vcpu", machine.vcpus)?;

        write_cpu(w, machine)?;
        write_clock(w, machine)?;

        w.element("os", |w| {
            w.element("type", |w| {
                w.attribute("arch", env!("HOST_ARCH"))?;
                w.text("hvm")
            })
        })?;

        w.element("features", |w| {
            if machine.cpu.acpi {
                w.empty_element("acpi")?;
            }
            if machine.cpu.apic {
                w.empty_element("apic")?;
            }
            if machine.cpu.pae {
                w.empty_element("pae")?;
            }
            Ok(())
        })?;

        w.element("devices", |w| {
            for (i, disk) in machine.disks.iter().enumerate() {
                write_disk(w, disk, i, &data_conns[i])?;
            }
            for removable in &machine.removable {
                write_removable(w, removable)?;
            }
            for interface in &machine.interfaces {
                write_interface(w, machine, interface)?;
            }
            Ok(())
        })
    })
}

fn write_cpu<W: Write>(w: &mut XmlWriter<W>, machine: &Machine) -> Result<()> {
    let cpu = &machine.cpu;
    let has_topology = cpu.sockets != 0 || cpu.cores != 0 || cpu.threads != 0;
    if cpu.vendor.is_none() && cpu.model.is_none() && !has_topology {
        return Ok(());
    }
    // https://libvirt.org/formatdomain.html#cpu-model-and-topology
    w.element("cpu", |w| {
        w.attribute("match", "minimum")?;
        if let Some(vendor) = &cpu.vendor {
            w.single_element("vendor", vendor)?;
        }
        if let Some(model) = &cpu.model {
            w.element("model", |w| {
                w.attribute("fallback", "allow")?;
                w.text(model)
            })?;
        }
        if has_topology {
            w.element("topology", |w| {
                if cpu.sockets != 0 {
                    w.attribute("sockets", cpu.sockets)?;
                }
                if cpu.cores != 0 {
                    w.attribute("cores", cpu.cores)?;
                }
                if cpu.threads != 0 {
                    w.attribute("threads", cpu.threads)?;
                }
                Ok(())
            })?;
        }
        Ok(())
    })
}

fn write_clock<W: Write>(w: &mut XmlWriter<W>, machine: &Machine) -> Result<()> {
    match machine.rtc.basis {
        // nothing known about the clock, emit no element
        RtcBasis::Unknown => Ok(()),
        RtcBasis::Utc => w.element("clock", |w| {
            if machine.rtc.offset == 0 {
                w.attribute("offset", "utc")
            } else {
                w.attribute("offset", "variable")?;
                w.attribute("basis", "utc")?;
                w.attribute("adjustment", machine.rtc.offset)
            }
        }),
        // offset is always 0 on a localtime clock
        RtcBasis::Localtime => {
            w.element("clock", |w| w.attribute("offset", "localtime"))
        }
    }
}

fn write_disk<W: Write>(
    w: &mut XmlWriter<W>,
    disk: &str,
    index: usize,
    conn: &DataConn,
) -> Result<()> {
    let dev = target_dev(disk, index);
    w.element("disk", |w| {
        w.attribute("type", "network")?;
        w.attribute("device", "disk")?;
        w.element("driver", |w| {
            w.attribute("name", "qemu")?;
            w.attribute("type", "raw")
        })?;
        w.element("source", |w| {
            w.attribute("protocol", "nbd")?;
            w.element("host", |w| {
                w.attribute("name", "localhost")?;
                w.attribute("port", conn.nbd_remote_port)
            })
        })?;
        w.element("target", |w| w.attribute("dev", &dev))
    })
}

fn write_removable<W: Write>(w: &mut XmlWriter<W>, dev: &str) -> Result<()> {
    // no <source>; the conversion tool attaches the medium itself
    w.element("disk", |w| {
        w.attribute("type", "network")?;
        w.attribute("device", "cdrom")?;
        w.element("driver", |w| {
            w.attribute("name", "qemu")?;
            w.attribute("type", "raw")
        })?;
        w.element("target", |w| w.attribute("dev", dev))
    })
}

fn write_interface<W: Write>(
    w: &mut XmlWriter<W>,
    machine: &Machine,
    interface: &str,
) -> Result<()> {
    let network = map_interface_to_network(&machine.network_map, interface);
    let mac = read_mac_address(interface);
    w.element("interface", |w| {
        w.attribute("type", "network")?;
        w.element("source", |w| w.attribute("network", network))?;
        w.element("target", |w| w.attribute("dev", interface))?;
        if let Some(mac) = &mac {
            w.element("mac", |w| w.attribute("address", mac))?;
        }
        Ok(())
    })
}

/// Pick the target device name for disk `index`.  Absolute paths and
/// overlong names get a generated "sd" + letters name; anything else is used
/// verbatim.
fn target_dev(disk: &str, index: usize) -> String {
    if !disk.starts_with('/') && disk.len() <= TARGET_DEV_MAX {
        disk.to_string()
    } else {
        format!("sd{}", drive_name(index))
    }
}

/// 0-based index into the drive-letter sequence a, b, .., z, aa, ab, ..
fn drive_name(index: usize) -> String {
    let mut letters = Vec::new();
    let mut i = index;
    loop {
        letters.push(b'a' + (i % 26) as u8);
        if i < 26 {
            break;
        }
        i = i / 26 - 1;
    }
    letters.reverse();
    letters.into_iter().map(char::from).collect()
}

/// Map `interface` through the user's network map, first match wins.  An
/// entry without a colon maps every interface.  The fallback for an empty
/// map or no match is [`DEFAULT_NETWORK`].
fn map_interface_to_network<'a>(network_map: &'a [String], interface: &str) -> &'a str {
    for entry in network_map {
        match entry.split_once(':') {
            None => return entry,
            Some((prefix, network)) if prefix == interface => return network,
            Some(_) => {}
        }
    }
    DEFAULT_NETWORK
}

fn read_mac_address(interface: &str) -> Option<String> {
    read_link_address(format!("/sys/class/net/{}/address", interface))
}

/// Best-effort read of an interface address pseudo-file.  Strips exactly one
/// trailing newline; any failure means the address is simply not reported.
fn read_link_address<P: AsRef<Path>>(path: P) -> Option<String> {
    let mut addr = fs::read_to_string(path).ok()?;
    if addr.ends_with('\n') {
        addr.pop();
    }
    Some(addr)
}
