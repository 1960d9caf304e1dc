use criterion::{black_box, criterion_group, criterion_main, Criterion};
use melsec_slmp::utils::{get_bits, set_bits};
use melsec_slmp::{
    parse_address, Codec, CommandPlan, Device, DeviceAddress, Direction, ElementType, RandomReadCommand,
    SlmpHeader, SlmpResponse, Variable,
};

fn bench_addresses(c: &mut Criterion) {
    c.bench_function("parse_address", |b| {
        b.iter(|| {
            parse_address(black_box("D12345")).unwrap();
            parse_address(black_box("X1FF")).unwrap();
            parse_address(black_box("LSTN7")).unwrap();
        })
    });
}

fn bench_frames(c: &mut Criterion) {
    let header = SlmpHeader::default();
    let words: Vec<_> = (0..94).map(|i| DeviceAddress::new(Device::D, i * 3)).collect();
    let cmd = RandomReadCommand::new(words, Vec::new()).unwrap();

    c.bench_function("random_read_frame_extended", |b| {
        b.iter(|| cmd.to_request(black_box(Codec::Extended)).unwrap().to_frame(&header))
    });

    let mut response = vec![0xD0, 0x00, 0x00, 0xFF, 0xFF, 0x03, 0x00];
    response.extend_from_slice(&(2u16 + 188).to_le_bytes());
    response.extend_from_slice(&[0x00, 0x00]);
    response.extend(std::iter::repeat(0xA5).take(188));
    c.bench_function("parse_response", |b| {
        b.iter(|| SlmpResponse::from_bytes(black_box(&response)).unwrap())
    });
}

fn bench_bitstream(c: &mut Criterion) {
    let mut buf = vec![0u8; 256];
    c.bench_function("set_get_bits_unaligned", |b| {
        b.iter(|| {
            for i in 0..30 {
                set_bits(&mut buf, i * 61 + 3, 61, black_box(0x0F0F_F0F0_1234_5678));
            }
            (0..30).map(|i| get_bits(&buf, i * 61 + 3, 61)).sum::<u64>()
        })
    });
}

fn bench_plan(c: &mut Criterion) {
    let vars: Vec<Variable> = (0..500)
        .map(|i| {
            let (device, ty) = match i % 3 {
                0 => (Device::D, ElementType::Word),
                1 => (Device::D, ElementType::Real),
                _ => (Device::M, ElementType::Bool),
            };
            Variable::scalar(format!("v{i}"), DeviceAddress::new(device, i * 7), ty).unwrap()
        })
        .collect();

    c.bench_function("plan_500_read", |b| {
        b.iter(|| CommandPlan::new(Direction::Read, black_box(vars.clone())).unwrap())
    });
    c.bench_function("plan_500_write", |b| {
        b.iter(|| CommandPlan::new(Direction::Write, black_box(vars.clone())).unwrap())
    });
}

criterion_group!(benches, bench_addresses, bench_frames, bench_bitstream, bench_plan);
criterion_main!(benches);
