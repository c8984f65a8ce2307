use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use mdf3_rs::blocks::{ChannelBlock, DataType};
use mdf3_rs::build_record_layout;

/// A channel list in the shape record layouts usually see: a 64-bit master
/// followed by byte-aligned value channels of mixed widths, plus a packed
/// flag cluster sharing one 16-bit field.
fn channel_list(n: usize) -> (Vec<ChannelBlock>, usize) {
    let mut channels = Vec::with_capacity(n + 5);
    let mut offset_bits = 0u32;

    let mut master = ChannelBlock::default();
    master.short_name = String::from("time");
    master.bit_count = 64;
    master.data_type = DataType::DoubleLE;
    channels.push(master);
    offset_bits += 64;

    for i in 0..n {
        let mut ch = ChannelBlock::default();
        ch.short_name = format!("signal_{i}");
        ch.start_offset = offset_bits as u16;
        ch.bit_count = match i % 3 {
            0 => 8,
            1 => 16,
            _ => 32,
        };
        ch.data_type = DataType::UnsignedIntegerLE;
        channels.push(ch);
        offset_bits += match i % 3 {
            0 => 8,
            1 => 16,
            _ => 32,
        };
    }

    // Four flags packed into one 16-bit slot
    for i in 0..4 {
        let mut flag = ChannelBlock::default();
        flag.short_name = format!("flag_{i}");
        flag.start_offset = (offset_bits + 4 * i) as u16;
        flag.bit_count = 4;
        flag.data_type = DataType::UnsignedIntegerLE;
        channels.push(flag);
    }
    offset_bits += 16;

    (channels, (offset_bits as usize).div_ceil(8))
}

fn bench_build_record_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_record_layout");
    for &n in &[4usize, 32, 256, 1024] {
        let (channels, record_size) = channel_list(n);
        group.throughput(Throughput::Elements(channels.len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(n),
            &channels,
            |b, channels| {
                b.iter(|| {
                    let layout = build_record_layout(channels, record_size);
                    assert!(!layout.fields.is_empty());
                    layout
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_build_record_layout);
criterion_main!(benches);
