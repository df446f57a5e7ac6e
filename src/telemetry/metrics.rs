//! Buffer and cache metrics via the `metrics` facade.
//!
//! Fire-and-forget: without an installed recorder every call is a no-op.

use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Register descriptions for every metric this crate emits.
pub fn init_metrics() {
    describe_counter!("zcio_buffer_allocs_total", "File buffers allocated");
    describe_counter!("zcio_buffer_frees_total", "File buffers returned to the allocator");
    describe_counter!("zcio_buffer_freed_bytes_total", Unit::Bytes, "Bytes returned to the allocator");
    describe_histogram!("zcio_buffer_alloc_bytes", Unit::Bytes, "Size of allocated file buffers");
    describe_counter!("zcio_buffer_refs_total", "Buffer lookups, labelled hit or miss");
    describe_counter!("zcio_cache_evictions_total", "Entries evicted from the file cache");
    describe_histogram!("zcio_cache_eviction_bytes", Unit::Bytes, "Size of evicted entries");
    describe_gauge!("zcio_allocator_used_bytes", Unit::Bytes, "Bytes handed out by the allocator");
    describe_gauge!("zcio_allocator_free_bytes", Unit::Bytes, "Bytes in allocator free lists");
}

pub fn record_buffer_alloc(size: usize) {
    counter!("zcio_buffer_allocs_total").increment(1);
    histogram!("zcio_buffer_alloc_bytes").record(size as f64);
}

pub fn record_buffer_free(size: usize) {
    counter!("zcio_buffer_frees_total").increment(1);
    counter!("zcio_buffer_freed_bytes_total").increment(size as u64);
}

/// One lookup by key; `hit` when a buffer was handed out.
pub fn record_buffer_ref(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("zcio_buffer_refs_total", "result" => result).increment(1);
}

pub fn record_cache_eviction(size: usize) {
    counter!("zcio_cache_evictions_total").increment(1);
    histogram!("zcio_cache_eviction_bytes").record(size as f64);
}

pub fn record_allocator_usage(used: usize, free: usize) {
    gauge!("zcio_allocator_used_bytes").set(used as f64);
    gauge!("zcio_allocator_free_bytes").set(free as f64);
}
