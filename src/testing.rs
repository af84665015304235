//! Simulated host for unit tests.
//!
//! [`FakeHost`] implements [`CommandExecutor`] by interpreting the exact
//! invocations the tool adapters issue and mutating an in-memory
//! [`HostState`], so probe → apply → probe cycles can be tested end to end.

use anyhow::Result;
use ipnet::Ipv4Net;
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::Mutex;

use crate::cmd_abstraction::{CommandExecutor, CommandOutput};
use crate::fs_abstraction::{real_fs, FileSystem, MockFileSystem};
use crate::mac::MacAddr;

pub const VENDOR_TOOL: &str = "IpConfigUtility";

pub fn camera_mac() -> MacAddr {
    MacAddr::new([0x1c, 0x0f, 0xaf, 0x12, 0x34, 0x56])
}

/// A filesystem that lists `names` under `/sys/class/net` (none of them
/// wireless) and passes every other call through to the real filesystem.
pub fn sysfs_overlay(names: &'static [&'static str]) -> MockFileSystem {
    let mut fs = MockFileSystem::new();
    fs.expect_list_dir().returning(move |p| {
        if p.starts_with("/sys/class/net") {
            Ok(names.iter().map(|n| n.to_string()).collect())
        } else {
            real_fs().list_dir(p)
        }
    });
    fs.expect_exists()
        .returning(|p| !p.starts_with("/sys") && real_fs().exists(p));
    fs.expect_read_to_string()
        .returning(|p| real_fs().read_to_string(p));
    fs.expect_write().returning(|p, c| real_fs().write(p, c));
    fs.expect_create_dir_all()
        .returning(|p| real_fs().create_dir_all(p));
    fs.expect_rename().returning(|a, b| real_fs().rename(a, b));
    fs
}

#[derive(Debug, Clone)]
pub struct HostState {
    pub name: String,
    pub mac: MacAddr,
    pub admin_up: bool,
    /// Physical carrier; reported as LOWER_UP only while admin up
    pub carrier: bool,
    pub mtu: u32,
    pub max_mtu: u32,
    pub addresses: Vec<Ipv4Net>,
    pub ring_supported: bool,
    pub ring_max: u32,
    pub ring_current: u32,
    pub sysctl: BTreeMap<String, u64>,
    pub firewall_active: bool,
    pub firewall_rules: Vec<String>,
    pub nm_active: bool,
    pub nm_managed: bool,
    pub neighbors: Vec<(Ipv4Addr, MacAddr)>,
    pub sweep_devices: Vec<(Ipv4Addr, MacAddr)>,
    pub sweep_fails: bool,
    pub vendor_output: Result<String, String>,
    /// Programs reported as not installed
    pub missing: HashSet<&'static str>,
    /// Programs whose every invocation fails
    pub failing: HashSet<&'static str>,
    /// Programs that refuse to run without root
    pub root_only: HashSet<&'static str>,
    /// Mutating invocations, in order
    pub calls: Vec<String>,
}

impl Default for HostState {
    fn default() -> Self {
        let mut sysctl = BTreeMap::new();
        sysctl.insert("net.core.rmem_default".to_string(), 212_992);
        sysctl.insert("net.core.rmem_max".to_string(), 212_992);
        sysctl.insert("net.ipv4.conf.all.rp_filter".to_string(), 1);
        sysctl.insert("net.ipv4.conf.default.rp_filter".to_string(), 1);
        sysctl.insert("net.ipv4.conf.eth0.rp_filter".to_string(), 2);

        Self {
            name: "eth0".to_string(),
            mac: MacAddr::new([0x3c, 0xec, 0xef, 0x01, 0x02, 0x03]),
            admin_up: false,
            carrier: true,
            mtu: 1500,
            max_mtu: 9216,
            addresses: Vec::new(),
            ring_supported: true,
            ring_max: 4096,
            ring_current: 256,
            sysctl,
            firewall_active: true,
            firewall_rules: Vec::new(),
            nm_active: true,
            nm_managed: true,
            neighbors: Vec::new(),
            sweep_devices: Vec::new(),
            sweep_fails: false,
            vendor_output: Ok("No devices found\n".to_string()),
            missing: HashSet::new(),
            failing: HashSet::new(),
            root_only: HashSet::new(),
            calls: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate or inspect the simulated state.
    pub fn with<R>(&self, f: impl FnOnce(&mut HostState) -> R) -> R {
        let mut guard = self.state.lock().unwrap();
        f(&mut guard)
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|s| s.calls.clear());
    }
}

impl CommandExecutor for FakeHost {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let mut s = self.state.lock().unwrap();
        if s.missing.contains(cmd) {
            anyhow::bail!("No such file or directory (os error 2)");
        }
        if s.failing.contains(cmd) {
            return Ok(CommandOutput::failed(1, format!("{}: simulated failure", cmd)));
        }
        if s.root_only.contains(cmd) {
            return Ok(CommandOutput::failed(
                1,
                "ERROR: You need to be root to run this script",
            ));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Ok(dispatch(&mut s, cmd, &args))
    }

    fn is_available(&self, cmd: &str) -> bool {
        !self.state.lock().unwrap().missing.contains(cmd)
    }
}

fn dispatch(s: &mut HostState, cmd: &str, args: &[&str]) -> CommandOutput {
    match cmd {
        "ip" => ip(s, args),
        "ethtool" => ethtool(s, args),
        "sysctl" => sysctl(s, args),
        "ufw" => ufw(s, args),
        "systemctl" => systemctl(s, args),
        "nmcli" => nmcli(s, args),
        "arp-scan" => arp_scan(s),
        VENDOR_TOOL => match &s.vendor_output {
            Ok(out) => CommandOutput::ok(out.clone()),
            Err(e) => CommandOutput::failed(1, e.clone()),
        },
        _ => CommandOutput::failed(127, format!("{}: command not found", cmd)),
    }
}

fn no_device(name: &str) -> CommandOutput {
    CommandOutput::failed(1, format!("Device \"{}\" does not exist.", name))
}

fn ip(s: &mut HostState, args: &[&str]) -> CommandOutput {
    let dev = args
        .iter()
        .position(|a| *a == "dev")
        .and_then(|i| args.get(i + 1))
        .copied()
        .unwrap_or_default();
    if dev != s.name {
        return no_device(dev);
    }
    match args {
        ["-o", "link", "show", "dev", _] => {
            let mut flags = vec!["BROADCAST", "MULTICAST"];
            if s.admin_up {
                flags.push("UP");
                if s.carrier {
                    flags.push("LOWER_UP");
                }
            }
            let state = if s.admin_up && s.carrier { "UP" } else { "DOWN" };
            CommandOutput::ok(format!(
                "2: {}: <{}> mtu {} qdisc mq state {} mode DEFAULT group default qlen 1000\\    link/ether {} brd ff:ff:ff:ff:ff:ff\n",
                s.name,
                flags.join(","),
                s.mtu,
                state,
                s.mac
            ))
        }
        ["-4", "-o", "addr", "show", "dev", _] => {
            let out: String = s
                .addresses
                .iter()
                .map(|a| {
                    format!(
                        "2: {}    inet {} brd {} scope link {}\\       valid_lft forever preferred_lft forever\n",
                        s.name,
                        a,
                        a.broadcast(),
                        s.name
                    )
                })
                .collect();
            CommandOutput::ok(out)
        }
        ["-4", "neigh", "show", "dev", _] => {
            let out: String = s
                .neighbors
                .iter()
                .map(|(ip, mac)| format!("{} lladdr {} REACHABLE\n", ip, mac))
                .collect();
            CommandOutput::ok(out)
        }
        ["link", "set", "dev", _, "up"] => {
            s.calls.push(format!("ip link set dev {} up", s.name));
            s.admin_up = true;
            CommandOutput::ok("")
        }
        ["link", "set", "dev", _, "mtu", mtu] => {
            let Ok(mtu) = mtu.parse::<u32>() else {
                return CommandOutput::failed(1, "Error: argument is not a number");
            };
            s.calls.push(format!("ip link set dev {} mtu {}", s.name, mtu));
            if mtu > s.max_mtu {
                return CommandOutput::failed(2, "Error: mtu greater than device maximum.");
            }
            s.mtu = mtu;
            CommandOutput::ok("")
        }
        ["-4", "addr", "flush", "dev", _] => {
            s.calls.push(format!("ip -4 addr flush dev {}", s.name));
            s.addresses.clear();
            CommandOutput::ok("")
        }
        ["addr", "add", addr, "dev", _] => {
            let Ok(net) = addr.parse::<Ipv4Net>() else {
                return CommandOutput::failed(1, "Error: any valid prefix is expected");
            };
            s.calls.push(format!("ip addr add {} dev {}", net, s.name));
            if s.addresses.contains(&net) {
                return CommandOutput::failed(2, "RTNETLINK answers: File exists");
            }
            s.addresses.push(net);
            CommandOutput::ok("")
        }
        _ => CommandOutput::failed(255, format!("unsupported ip invocation: {:?}", args)),
    }
}

fn ethtool(s: &mut HostState, args: &[&str]) -> CommandOutput {
    match args {
        ["-g", dev] if *dev == s.name => {
            if !s.ring_supported {
                return CommandOutput::failed(
                    94,
                    "netlink error: Operation not supported",
                );
            }
            CommandOutput::ok(format!(
                "Ring parameters for {}:\nPre-set maximums:\nRX:\t\t{}\nRX Mini:\tn/a\nRX Jumbo:\tn/a\nTX:\t\t{}\nCurrent hardware settings:\nRX:\t\t{}\nRX Mini:\tn/a\nRX Jumbo:\tn/a\nTX:\t\t{}\n",
                s.name, s.ring_max, s.ring_max, s.ring_current, s.ring_current
            ))
        }
        ["-G", dev, "rx", rx] if *dev == s.name => {
            s.calls.push(format!("ethtool -G {} rx {}", s.name, rx));
            match rx.parse::<u32>() {
                Ok(rx) if rx <= s.ring_max => {
                    s.ring_current = rx;
                    CommandOutput::ok("")
                }
                _ => CommandOutput::failed(1, "netlink error: Invalid argument"),
            }
        }
        [_, dev, ..] => no_device(dev),
        _ => CommandOutput::failed(1, "ethtool: bad command line argument(s)"),
    }
}

fn sysctl(s: &mut HostState, args: &[&str]) -> CommandOutput {
    match args {
        ["-n", key] => match s.sysctl.get(*key) {
            Some(v) => CommandOutput::ok(format!("{}\n", v)),
            None => CommandOutput::failed(
                255,
                format!(
                    "sysctl: cannot stat /proc/sys/{}: No such file or directory",
                    key.replace('.', "/")
                ),
            ),
        },
        ["-w", assignment] => {
            s.calls.push(format!("sysctl -w {}", assignment));
            let Some((key, value)) = assignment.split_once('=') else {
                return CommandOutput::failed(255, "sysctl: malformed setting");
            };
            match (s.sysctl.contains_key(key), value.parse::<u64>()) {
                (true, Ok(v)) => {
                    s.sysctl.insert(key.to_string(), v);
                    CommandOutput::ok(format!("{} = {}\n", key, v))
                }
                _ => CommandOutput::failed(255, format!("sysctl: cannot stat {}", key)),
            }
        }
        _ => CommandOutput::failed(255, "sysctl: unsupported invocation"),
    }
}

fn ufw(s: &mut HostState, args: &[&str]) -> CommandOutput {
    match args {
        ["status"] => {
            if !s.firewall_active {
                return CommandOutput::ok("Status: inactive\n");
            }
            let mut out = String::from(
                "Status: active\n\nTo                         Action      From\n--                         ------      ----\n",
            );
            for rule in &s.firewall_rules {
                out.push_str(rule);
                out.push('\n');
            }
            CommandOutput::ok(out)
        }
        ["allow", "from", range, "to", "any", "proto", "udp"] => {
            s.calls.push(format!("ufw allow from {} to any proto udp", range));
            push_rule(s, format!("Anywhere/udp               ALLOW       {}/udp", range))
        }
        ["allow", "from", range, "to", "any", "port", port, "proto", "tcp"] => {
            s.calls.push(format!("ufw allow from {} to any port {} proto tcp", range, port));
            push_rule(s, format!("{}/tcp                   ALLOW       {}", port, range))
        }
        ["reload"] => CommandOutput::ok("Firewall reloaded\n"),
        _ => CommandOutput::failed(1, "ERROR: Invalid syntax"),
    }
}

fn push_rule(s: &mut HostState, rule: String) -> CommandOutput {
    if s.firewall_rules.contains(&rule) {
        return CommandOutput::ok("Skipping adding existing rule\n");
    }
    s.firewall_rules.push(rule);
    CommandOutput::ok("Rule added\n")
}

fn systemctl(s: &mut HostState, args: &[&str]) -> CommandOutput {
    match args {
        ["is-active", "NetworkManager"] => {
            if s.nm_active {
                CommandOutput::ok("active\n")
            } else {
                CommandOutput {
                    stdout: "inactive\n".to_string(),
                    stderr: String::new(),
                    success: false,
                    code: Some(3),
                }
            }
        }
        ["stop", "NetworkManager"] => {
            s.calls.push("systemctl stop NetworkManager".to_string());
            s.nm_active = false;
            CommandOutput::ok("")
        }
        _ => CommandOutput::failed(1, "Unknown command verb"),
    }
}

fn nmcli(s: &mut HostState, args: &[&str]) -> CommandOutput {
    if !s.nm_active {
        return CommandOutput::failed(
            8,
            "Error: NetworkManager is not running.",
        );
    }
    match args {
        ["-t", "-f", "DEVICE,STATE", "device", "status"] => {
            let state = if s.nm_managed { "connected" } else { "unmanaged" };
            CommandOutput::ok(format!("{}:{}\nlo:unmanaged\n", s.name, state))
        }
        ["device", "set", dev, "managed", "no"] if *dev == s.name => {
            s.calls.push(format!("nmcli device set {} managed no", s.name));
            s.nm_managed = false;
            CommandOutput::ok("")
        }
        _ => CommandOutput::failed(2, "Error: invalid arguments"),
    }
}

fn arp_scan(s: &mut HostState) -> CommandOutput {
    if s.sweep_fails {
        return CommandOutput::failed(1, "pcap_activate: eth0: You don't have permission");
    }
    let mut out = format!(
        "Interface: {}, type: EN10MB, MAC: {}, IPv4: 169.254.1.1\nStarting arp-scan 1.10.0 with 65536 hosts\n",
        s.name, s.mac
    );
    for (ip, mac) in &s.sweep_devices {
        out.push_str(&format!("{}\t{}\n", ip, mac));
    }
    out.push_str("\n1 packets received by filter, 0 packets dropped by kernel\n");
    CommandOutput::ok(out)
}
