use std::{
    fmt::Write as _,
    fs,
    path::Path,
};

use anyhow::{Context, Error};

use crate::tables::SyncTables;

/// File listing threads, spawns, and barrier participants.
pub const PTHREAD_FILE: &str = "sigil.pthread.out";

/// File listing per-thread and per-barrier counters.
pub const STATS_FILE: &str = "sigil.stats.out";

/// Writes the trace-wide metadata files under `out_dir`.
///
/// Called once, after the dispatcher has finished; takes the global
/// table lock for the duration of both dumps.
pub fn write_outputs(tables: &SyncTables, out_dir: &Path) -> Result<(), Error> {
    let tables = tables.lock()?;

    let mut pthread = String::new();
    let threads: Vec<String> = tables
        .threads_in_order
        .iter()
        .map(|tid| tid.to_string())
        .collect();
    writeln!(pthread, "{}", threads.join(" "))?;
    for (spawner, spawnee) in &tables.thread_spawns {
        writeln!(pthread, "{spawner} {spawnee:#x}")?;
    }
    for (addr, participants) in &tables.barriers {
        let tids: Vec<String> = participants.iter().map(|tid| tid.to_string()).collect();
        writeln!(pthread, "{addr:#x} {}", tids.join(" "))?;
    }

    let path = out_dir.join(PTHREAD_FILE);
    fs::write(&path, pthread).with_context(|| format!("writing {}", path.display()))?;

    let mut stats = String::new();
    for (tid, s) in &tables.thread_stats {
        writeln!(
            stats,
            "thread {tid} iops {} flops {} reads {} writes {} instrs {}",
            s.iops, s.flops, s.reads, s.writes, s.instrs
        )?;
    }
    for (addr, s) in &tables.barrier_stats {
        writeln!(
            stats,
            "barrier {addr:#x} iops {} flops {} instrs {} memaccesses {} locks {}",
            s.iops, s.flops, s.instrs, s.mem_accesses, s.locks
        )?;
    }

    let path = out_dir.join(STATS_FILE);
    fs::write(&path, stats).with_context(|| format!("writing {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use stgen_core::stats::Stats;

    use super::{write_outputs, PTHREAD_FILE, STATS_FILE};
    use crate::tables::SyncTables;

    #[test]
    fn metadata_files_layout() {
        let tables = SyncTables::new();
        tables.register_thread(1).unwrap();
        tables.register_thread(3).unwrap();
        tables.record_spawn(1, 0xa).unwrap();
        tables.record_spawn(3, 0xc).unwrap();
        tables.record_barrier(0xb1, 1).unwrap();
        tables.record_barrier(0xb1, 3).unwrap();
        tables
            .record_thread_stats(
                1,
                Stats {
                    iops: 3,
                    flops: 2,
                    reads: 1,
                    writes: 1,
                    instrs: 0,
                },
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        write_outputs(&tables, dir.path()).unwrap();

        let pthread = std::fs::read_to_string(dir.path().join(PTHREAD_FILE)).unwrap();
        assert_eq!(pthread, "1 3\n1 0xa\n3 0xc\n0xb1 1 3\n");

        let stats = std::fs::read_to_string(dir.path().join(STATS_FILE)).unwrap();
        assert_eq!(stats, "thread 1 iops 3 flops 2 reads 1 writes 1 instrs 0\n");
    }
}
