//! Operator shell commands for the Group Object Table and device identity

use std::sync::Arc;

use async_trait::async_trait;
use knx_cfgmgr_common::{
    CommandOutput, KnxMgr, KnxMgrError, KnxMgrResult, ResetCode, Shell, ShellCommand,
    ShellStatus,
};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::got_mgr::GotMgr;
use crate::types::{CommitReport, GroupAddress, GroupObjectEntry};

/// Resource paths accepted by `knx_got add`
static URI_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(/[A-Za-z0-9._~-]+)+$").expect("Invalid regex pattern"));

const GOT_ADD_USAGE: &str = "knx_got add *id* *uri_path* *cflags* ga *group_addresses*";
const GOT_REMOVE_USAGE: &str = "knx_got remove *id*";
const NOT_IN_RUNTIME: &str = "Not in loaded state or need to set IA and/or IID before.";

/// Parse one numeric token
pub fn parse_number<T: std::str::FromStr>(field: &str, token: &str) -> KnxMgrResult<T> {
    token
        .parse::<T>()
        .map_err(|_| KnxMgrError::invalid_argument(field, format!("'{}' is not a number", token)))
}

/// Check a resource path of the form `/segment/...`
pub fn validate_uri_path(uri: &str) -> KnxMgrResult<()> {
    if URI_PATH_RE.is_match(uri) {
        Ok(())
    } else {
        Err(KnxMgrError::invalid_argument(
            "uri",
            format!("'{}' is not a resource path", uri),
        ))
    }
}

/// Build an entry from `add <id> <uri> <cflags> ga <addr>...` arguments
///
/// `args` starts at `add`.
pub fn parse_got_add(args: &[&str]) -> KnxMgrResult<GroupObjectEntry> {
    if args.len() < 6 || args[4] != "ga" {
        return Err(KnxMgrError::invalid_argument("args", GOT_ADD_USAGE));
    }

    let id: i32 = parse_number("id", args[1])?;
    let uri = args[2];
    validate_uri_path(uri)?;
    let cflags: u32 = parse_number("cflags", args[3])?;
    let ga = args[5..]
        .iter()
        .map(|token| parse_number::<GroupAddress>("ga", token))
        .collect::<KnxMgrResult<Vec<_>>>()?;

    Ok(GroupObjectEntry::new(id, uri, cflags, ga))
}

fn print_warnings(report: &CommitReport, out: &mut CommandOutput) {
    for warning in &report.warnings {
        out.line(format!("Warning: {}", warning));
    }
}

/// `knx_got add|show|remove`
pub struct KnxGotCommand {
    mgr: GotMgr,
}

impl KnxGotCommand {
    pub fn new(mgr: GotMgr) -> Self {
        Self { mgr }
    }

    async fn add(&self, args: &[&str], out: &mut CommandOutput) -> ShellStatus {
        if args.len() < 6 || args[4] != "ga" {
            out.line(GOT_ADD_USAGE);
            return ShellStatus::InvalidArgs;
        }

        let entry = match parse_got_add(args) {
            Ok(entry) => entry,
            Err(e) => {
                // Runtime state is reported ahead of argument errors
                if !self.mgr.is_in_runtime().await {
                    out.line(NOT_IN_RUNTIME);
                    return ShellStatus::InvalidState;
                }
                out.line(e.to_string());
                out.line(GOT_ADD_USAGE);
                return ShellStatus::InvalidArgs;
            }
        };

        match self.mgr.add_entry_in_runtime(entry).await {
            Ok(report) => {
                out.extend(report.rendered.iter().cloned());
                print_warnings(&report, out);
                ShellStatus::Done
            }
            Err(KnxMgrError::InvalidState { .. }) => {
                out.line(NOT_IN_RUNTIME);
                ShellStatus::InvalidState
            }
            Err(KnxMgrError::DuplicateId { .. }) => {
                out.line("Group Object Table ID already in use!");
                ShellStatus::InvalidArgs
            }
            Err(KnxMgrError::TableFull { .. }) => {
                out.line("Group Object Table is full!");
                ShellStatus::InvalidArgs
            }
            Err(e) => {
                out.line(e.to_string());
                ShellStatus::from(&e)
            }
        }
    }

    async fn show(&self, out: &mut CommandOutput) -> ShellStatus {
        out.line("Showing Group Object Table");
        out.extend(self.mgr.show().await);
        ShellStatus::Done
    }

    async fn remove(&self, args: &[&str], out: &mut CommandOutput) -> ShellStatus {
        if args.len() < 2 {
            out.line(GOT_REMOVE_USAGE);
            return ShellStatus::InvalidArgs;
        }

        let id: i32 = match parse_number("id", args[1]) {
            Ok(id) => id,
            Err(e) => {
                out.line(e.to_string());
                return ShellStatus::InvalidArgs;
            }
        };

        match self.mgr.remove_entry(id).await {
            Ok(report) => {
                print_warnings(&report, out);
                ShellStatus::Done
            }
            Err(KnxMgrError::NotFound { .. }) => {
                out.line("Group Object Table ID not found!");
                ShellStatus::InvalidArgs
            }
            Err(e) => {
                out.line(e.to_string());
                ShellStatus::from(&e)
            }
        }
    }
}

#[async_trait]
impl ShellCommand for KnxGotCommand {
    fn name(&self) -> &str {
        "knx_got"
    }

    fn usage(&self) -> &str {
        "knx_got add|show|remove"
    }

    async fn run(&self, args: &[&str], out: &mut CommandOutput) -> ShellStatus {
        match args.first().copied() {
            Some("add") => self.add(args, out).await,
            Some("show") => self.show(out).await,
            Some("remove") => self.remove(args, out).await,
            _ => ShellStatus::InvalidArgs,
        }
    }
}

/// `knx_ia [addr]`
pub struct KnxIaCommand {
    mgr: GotMgr,
}

impl KnxIaCommand {
    pub fn new(mgr: GotMgr) -> Self {
        Self { mgr }
    }
}

#[async_trait]
impl ShellCommand for KnxIaCommand {
    fn name(&self) -> &str {
        "knx_ia"
    }

    fn usage(&self) -> &str {
        "'knx_ia' outputs device individual address, 'knx_ia *addr*' sets device individual address"
    }

    async fn run(&self, args: &[&str], out: &mut CommandOutput) -> ShellStatus {
        match args {
            [] => {
                let ia = self.mgr.device_info().await.ia.unwrap_or_default();
                out.line(format!("Device individual address: {}", ia));
                ShellStatus::Done
            }
            [value] => match parse_number::<u32>("ia", value) {
                Ok(ia) => {
                    print_warnings(&self.mgr.set_ia(Some(ia)).await, out);
                    ShellStatus::Done
                }
                Err(e) => {
                    out.line(e.to_string());
                    ShellStatus::InvalidArgs
                }
            },
            _ => {
                out.line(self.usage());
                ShellStatus::InvalidArgs
            }
        }
    }
}

/// `knx_iid [iid]`
pub struct KnxIidCommand {
    mgr: GotMgr,
}

impl KnxIidCommand {
    pub fn new(mgr: GotMgr) -> Self {
        Self { mgr }
    }
}

#[async_trait]
impl ShellCommand for KnxIidCommand {
    fn name(&self) -> &str {
        "knx_iid"
    }

    fn usage(&self) -> &str {
        "'knx_iid' outputs device installation id, 'knx_iid *iid*' sets device installation id"
    }

    async fn run(&self, args: &[&str], out: &mut CommandOutput) -> ShellStatus {
        match args {
            [] => {
                let iid = self.mgr.device_info().await.iid.unwrap_or_default();
                out.line(format!("Device installation id: {}", iid));
                ShellStatus::Done
            }
            [value] => match parse_number::<u64>("iid", value) {
                Ok(iid) => {
                    print_warnings(&self.mgr.set_iid(iid).await, out);
                    ShellStatus::Done
                }
                Err(e) => {
                    out.line(e.to_string());
                    ShellStatus::InvalidArgs
                }
            },
            _ => {
                out.line(self.usage());
                ShellStatus::InvalidArgs
            }
        }
    }
}

/// `knx_fid [fid]`
pub struct KnxFidCommand {
    mgr: GotMgr,
}

impl KnxFidCommand {
    pub fn new(mgr: GotMgr) -> Self {
        Self { mgr }
    }
}

#[async_trait]
impl ShellCommand for KnxFidCommand {
    fn name(&self) -> &str {
        "knx_fid"
    }

    fn usage(&self) -> &str {
        "'knx_fid' outputs fabric identifier, 'knx_fid *fid*' sets fabric identifier"
    }

    async fn run(&self, args: &[&str], out: &mut CommandOutput) -> ShellStatus {
        match args {
            [] => {
                out.line(format!("Fabric identifier: {}", self.mgr.device_info().await.fid));
                ShellStatus::Done
            }
            [value] => match parse_number::<u64>("fid", value) {
                Ok(fid) => {
                    print_warnings(&self.mgr.set_fid(fid).await, out);
                    ShellStatus::Done
                }
                Err(e) => {
                    out.line(e.to_string());
                    ShellStatus::InvalidArgs
                }
            },
            _ => {
                out.line(self.usage());
                ShellStatus::InvalidArgs
            }
        }
    }
}

/// `knx_pm [0|1]`
pub struct KnxPmCommand {
    mgr: GotMgr,
}

impl KnxPmCommand {
    pub fn new(mgr: GotMgr) -> Self {
        Self { mgr }
    }
}

#[async_trait]
impl ShellCommand for KnxPmCommand {
    fn name(&self) -> &str {
        "knx_pm"
    }

    fn usage(&self) -> &str {
        "'knx_pm' outputs programming mode status, 'knx_pm 1' sets mode true, 'knx_pm 0' sets mode false"
    }

    async fn run(&self, args: &[&str], out: &mut CommandOutput) -> ShellStatus {
        let enabled = match args {
            [] => {
                let pm = self.mgr.device_info().await.programming_mode;
                out.line(format!(
                    "Device in programming mode: {}",
                    if pm { "TRUE" } else { "FALSE" }
                ));
                return ShellStatus::Done;
            }
            ["1"] => true,
            ["0"] => false,
            [_] => {
                out.line("Invalid argument");
                return ShellStatus::InvalidArgs;
            }
            _ => {
                out.line(self.usage());
                return ShellStatus::InvalidArgs;
            }
        };

        print_warnings(&self.mgr.set_programming_mode(enabled).await, out);
        ShellStatus::Done
    }
}

/// `knx_factoryreset`
pub struct KnxFactoryResetCommand {
    mgr: GotMgr,
}

impl KnxFactoryResetCommand {
    pub fn new(mgr: GotMgr) -> Self {
        Self { mgr }
    }
}

#[async_trait]
impl ShellCommand for KnxFactoryResetCommand {
    fn name(&self) -> &str {
        "knx_factoryreset"
    }

    fn usage(&self) -> &str {
        "knx_factoryreset"
    }

    async fn run(&self, _args: &[&str], out: &mut CommandOutput) -> ShellStatus {
        match self.mgr.reset(ResetCode::FactoryReset).await {
            Ok(()) => ShellStatus::Done,
            Err(e) => {
                out.line(e.to_string());
                ShellStatus::from(&e)
            }
        }
    }
}

/// Shell with every device command registered against `mgr`
pub fn build_shell(mgr: &GotMgr) -> Shell {
    let mut shell = Shell::new();
    shell.register(Arc::new(KnxGotCommand::new(mgr.clone())));
    shell.register(Arc::new(KnxIaCommand::new(mgr.clone())));
    shell.register(Arc::new(KnxIidCommand::new(mgr.clone())));
    shell.register(Arc::new(KnxFidCommand::new(mgr.clone())));
    shell.register(Arc::new(KnxPmCommand::new(mgr.clone())));
    shell.register(Arc::new(KnxFactoryResetCommand::new(mgr.clone())));
    shell
}
