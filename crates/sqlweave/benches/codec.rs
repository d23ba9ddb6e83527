use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sqlweave::builder::*;
use sqlweave::codec::{self, json, xml};
use sqlweave::expressions::TableName;
use sqlweave::Node;

fn join_query() -> Node {
    let u = table_ref(TableName::new(Some("dbo"), "Users"));
    let o = table_ref(TableName::new(Some("dbo"), "Orders"));
    select([u.col("Name"), o.col("Total")])
        .from(&u)
        .inner_join(&o, o.col("UserId").eq(u.col("Id")))
        .where_(u.col("Name").eq(lit("Ann")))
        .where_(o.col("UserId").in_list((0..20).map(lit)))
        .order_by([o.col("Total").desc()])
        .build()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let tree = join_query();

    group.bench_function("items", |b| b.iter(|| codec::encode(black_box(&tree))));
    group.bench_function("json", |b| b.iter(|| json::to_json(black_box(&tree))));
    group.bench_function("xml", |b| b.iter(|| xml::to_xml(black_box(&tree))));

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let tree = join_query();

    let items = codec::encode(&tree);
    group.bench_function("items", |b| b.iter(|| codec::decode(black_box(&items))));

    let rows = codec::to_rows(&tree);
    group.bench_function("rows", |b| b.iter(|| codec::from_rows(black_box(&rows))));

    let text = json::to_json(&tree).unwrap();
    group.bench_function("json", |b| b.iter(|| json::from_json(black_box(&text))));

    let text = xml::to_xml(&tree).unwrap();
    group.bench_function("xml", |b| b.iter(|| xml::from_xml(black_box(&text))));

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
