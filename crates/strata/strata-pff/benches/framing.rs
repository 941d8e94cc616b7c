use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::io::Cursor;
use strata_pff::{read_image, read_text, write_image, write_text};

const HEADER: &[u8] = b"{ quabo 0: { acq_mode: 2, mod_num: 14, qua_num: 0, pkt_num : 1, pkt_nsec : 2, tv_sec : 3, tv_usec : 4, status : 1}}";

fn bench_write_record(c: &mut Criterion) {
    let image = vec![0x5Au8; 2048];
    let mut out = Vec::with_capacity(1 << 20);

    let mut group = c.benchmark_group("pff");
    group.throughput(Throughput::Bytes((HEADER.len() + 2 + image.len() + 1) as u64));
    group.bench_function("write text+image", |b| {
        b.iter(|| {
            out.clear();
            write_text(&mut out, black_box(HEADER)).expect("text");
            write_image(&mut out, black_box(&image)).expect("image");
        });
    });
}

fn bench_read_record(c: &mut Criterion) {
    let mut stream = Vec::new();
    write_text(&mut stream, HEADER).expect("text");
    write_image(&mut stream, &[0x5Au8; 2048]).expect("image");

    let mut group = c.benchmark_group("pff");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("read text+image", |b| {
        b.iter(|| {
            let mut r = Cursor::new(&stream);
            black_box(read_text(&mut r).expect("text"));
            black_box(read_image(&mut r, 2048).expect("image"));
        });
    });
}

criterion_group!(benches, bench_write_record, bench_read_record);
criterion_main!(benches);
