//! Decoding benchmarks for masscan XML reports

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use deimos::{parse_xml, ScanArgs};

fn report(hosts: usize) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\"?>\n<nmaprun scanner=\"masscan\" start=\"1700000000\" version=\"1.3.2\" xmloutputversion=\"1.03\">\n<scaninfo type=\"syn\" protocol=\"tcp\" />\n",
    );
    for i in 0..hosts {
        xml.push_str(&format!(
            "<host endtime=\"{}\"><address addr=\"10.{}.{}.{}\" addrtype=\"ipv4\"/><ports><port protocol=\"tcp\" portid=\"{}\"><state state=\"open\" reason=\"syn-ack\" reason_ttl=\"64\"/></port></ports></host>\n",
            1_700_000_000 + i,
            (i >> 16) & 0xff,
            (i >> 8) & 0xff,
            i & 0xff,
            1 + i % 65535,
        ));
    }
    xml.push_str(&format!(
        "<runstats>\n<finished time=\"1700000100\" timestr=\"2023-11-14 22:15:00\" elapsed=\"100\" />\n<hosts up=\"{}\" down=\"0\" total=\"{}\" />\n</runstats>\n</nmaprun>\n",
        hosts, hosts
    ));
    xml
}

fn bench_parse_xml(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_xml");

    for hosts in [10usize, 1_000, 10_000] {
        let xml = report(hosts);
        group.throughput(Throughput::Bytes(xml.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(hosts), &xml, |b, xml| {
            b.iter(|| parse_xml(black_box(xml.as_bytes())).unwrap())
        });
    }

    group.finish();
}

fn bench_build_args(c: &mut Criterion) {
    c.bench_function("build_args", |b| {
        b.iter(|| {
            let ports: Vec<String> = (1..=100).map(|p| p.to_string()).collect();
            black_box(
                ScanArgs::new()
                    .with_targets(["10.0.0.0/8"])
                    .with_ports(&ports)
                    .with_udp_ports("53,161")
                    .with_rate(100_000)
                    .with_banners(),
            )
        })
    });
}

criterion_group!(benches, bench_parse_xml, bench_build_args);
criterion_main!(benches);
