use std::io::BufRead;

use anyhow::{anyhow, bail, Context, Error};

use stgen_core::types::{
    prim::{Comp, CompKind, Cxt, CxtKind, Mem, MemKind, Primitive, Sync, SyncKind},
    Addr,
};

/// Line-oriented primitive-event stream.
///
/// Stands in for the instrumentation front-end: one primitive per
/// line, blank lines and `#` comments skipped.
///
/// ```text
/// swap <tid>
/// load <addr> <bytes>
/// store <addr> <bytes>
/// iop
/// flop
/// sync <kind> <addr>
/// instr
/// ```
///
/// Numbers are decimal or `0x`-prefixed hex. A malformed line is a
/// fatal front-end contract violation; *semantically* untranslatable
/// sync kinds (the semaphore family) still parse and are dropped later
/// by the sync translator.
pub fn parse_stream<R: BufRead>(reader: R) -> impl Iterator<Item = Result<Primitive, Error>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| match line {
            Err(err) => Some(Err(Error::from(err).context("reading primitive stream"))),
            Ok(text) => match parse_line(&text) {
                Ok(None) => None,
                Ok(Some(prim)) => Some(Ok(prim)),
                Err(err) => Some(Err(err.context(format!("primitive stream line {}", idx + 1)))),
            },
        })
}

/// Parses one line; `None` for blanks and comments.
pub fn parse_line(line: &str) -> Result<Option<Primitive>, Error> {
    let mut tokens = line.split_whitespace();

    let Some(keyword) = tokens.next() else {
        return Ok(None);
    };
    if keyword.starts_with('#') {
        return Ok(None);
    }

    let prim = match keyword {
        "swap" => Primitive::Sync(Sync {
            kind: SyncKind::Swap,
            id: number(tokens.next(), "swap thread id")?,
        }),
        "load" | "store" => Primitive::Mem(Mem {
            kind: if keyword == "load" {
                MemKind::Load
            } else {
                MemKind::Store
            },
            addr: number(tokens.next(), "memory address")?,
            bytes: number(tokens.next(), "access width")?,
        }),
        "iop" => Primitive::Comp(Comp {
            kind: CompKind::Iop,
        }),
        "flop" => Primitive::Comp(Comp {
            kind: CompKind::Flop,
        }),
        "sync" => {
            let kind = sync_kind(
                tokens
                    .next()
                    .ok_or_else(|| anyhow!("sync primitive missing its kind"))?,
            )?;
            Primitive::Sync(Sync {
                kind,
                id: number(tokens.next(), "sync object address")?,
            })
        }
        "instr" => Primitive::Cxt(Cxt {
            kind: CxtKind::Instr,
            id: 0,
        }),
        other => bail!("unrecognized primitive {other:?}"),
    };

    if let Some(extra) = tokens.next() {
        bail!("trailing token {extra:?}");
    }

    Ok(Some(prim))
}

fn number(token: Option<&str>, what: &str) -> Result<Addr, Error> {
    let token = token.ok_or_else(|| anyhow!("missing {what}"))?;

    let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => Addr::from_str_radix(hex, 16),
        None => token.parse(),
    };

    parsed.with_context(|| format!("invalid {what} {token:?}"))
}

fn sync_kind(token: &str) -> Result<SyncKind, Error> {
    let kind = match token {
        "lock" => SyncKind::Lock,
        "unlock" => SyncKind::Unlock,
        "create" => SyncKind::Create,
        "join" => SyncKind::Join,
        "barrier" => SyncKind::Barrier,
        "condwait" => SyncKind::CondWait,
        "condsignal" => SyncKind::CondSignal,
        "condbroadcast" => SyncKind::CondBroadcast,
        "spinlock" => SyncKind::SpinLock,
        "spinunlock" => SyncKind::SpinUnlock,
        "seminit" => SyncKind::SemInit,
        "semwait" => SyncKind::SemWait,
        "sempost" => SyncKind::SemPost,
        "semgetvalue" => SyncKind::SemGetValue,
        "semdestroy" => SyncKind::SemDestroy,
        other => bail!("unrecognized sync kind {other:?}"),
    };

    Ok(kind)
}
