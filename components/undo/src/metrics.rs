use lazy_static::*;
use prometheus::*;

lazy_static! {
    pub static ref UNDO_DISCARD_PASS_COUNT: IntCounter =
        register_int_counter!("undo_discard_pass_count", "the count of completed discard passes",)
            .unwrap();
    pub static ref UNDO_FAILED_DISCARD_PASS_COUNT: IntCounter = register_int_counter!(
        "undo_failed_discard_pass_count",
        "the count of discard passes ended by an error",
    )
    .unwrap();
    pub static ref UNDO_DISCARD_ADVANCE_COUNT: IntCounter = register_int_counter!(
        "undo_discard_advance_count",
        "the count of undo logs whose discard pointer moved forward",
    )
    .unwrap();
    pub static ref UNDO_DISCARD_BYTES_COUNT: IntCounter =
        register_int_counter!("undo_discard_bytes_count", "total number of undo bytes discarded",)
            .unwrap();
    pub static ref UNDO_REPLAY_COUNT: IntCounter = register_int_counter!(
        "undo_replay_count",
        "the count of aborted transactions whose undo actions were replayed",
    )
    .unwrap();
    pub static ref UNDO_FAILED_REPLAY_COUNT: IntCounter =
        register_int_counter!("undo_failed_replay_count", "the count of failed undo replays",)
            .unwrap();
    pub static ref UNDO_TEMP_DISCARD_COUNT: IntCounter = register_int_counter!(
        "undo_temp_discard_count",
        "the count of temporary undo logs discarded",
    )
    .unwrap();
    pub static ref UNDO_OLDEST_XID_HAVING_UNDO: IntGauge = register_int_gauge!(
        "undo_oldest_xid_having_undo",
        "epoch and xid of the oldest transaction having undo, packed",
    )
    .unwrap();
    pub static ref UNDO_DISCARD_LATENCY_HISTOGRAM: Histogram = register_histogram!(
        "undo_discard_latency_histogram",
        "bucketed histogram of discard pass duration, the unit is us",
        exponential_buckets(1.0, 1.5, 32).unwrap()
    )
    .unwrap();
}
