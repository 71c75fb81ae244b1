/// Control-surface commands routed into a task's worker over a `flume`
/// channel (spec §4.4/§4.5). `Start` doubles as resume-from-pause, mirroring
/// the state table's "downloading, pause -> paused" / "paused, resume/start
/// -> downloading" rows.
#[derive(Debug, Clone)]
pub enum Command {
    Start,
    Pause,
    Cancel,
    ForceSave,
    RetrySegment(usize),
}
