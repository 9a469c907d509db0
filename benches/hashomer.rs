use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hex_literal::hex;

use hashomer::aes128v1::{AggregationServer, UserAgent};
use hashomer::{Geotag, MasterKey, PublishedKeys, T_DAY};

const INSTALL: u64 = 18_374 * T_DAY;

#[inline]
fn create_agent(n: u8) -> UserAgent {
    let k = hex!["adfd30251dfc5f6cfe240febf43970dd"];

    UserAgent::new(&[n; 16], &MasterKey::new(black_box(k)), INSTALL).unwrap()
}

fn published_feed(users: u8) -> PublishedKeys {
    let mut server = AggregationServer::new();

    for n in 0..users {
        server
            .receive_user_key(&mut create_agent(n).get_keys_for_server())
            .unwrap();
    }

    server.send_keys()
}

pub fn benchmarks(c: &mut Criterion) {
    c.bench_function("create agent", |b| b.iter(|| create_agent(0)));
    c.bench_function("advance a week", |b| {
        b.iter(|| {
            let mut a = create_agent(0);
            a.update_key_databases(INSTALL, INSTALL + 7 * T_DAY).unwrap();
        })
    });
    c.bench_function("generate ephemeral id", |b| {
        let a = create_agent(0);
        let g = Geotag::new([1, 2, 3, 4, 5]);
        b.iter(|| a.generate_ephemeral_id(black_box(INSTALL + 4_242), &g))
    });
    c.bench_function("receive key bundle", |b| {
        let a = create_agent(0);
        b.iter(|| {
            AggregationServer::new()
                .receive_user_key(&mut a.get_keys_for_server())
                .unwrap()
        })
    });
    c.bench_function("match 100 contacts against 10 users", |b| {
        let feed = published_feed(10);
        let g = Geotag::new([1, 2, 3, 4, 5]);
        let other = create_agent(100);
        let mut a = create_agent(42);
        for i in 0..100 {
            let id = other.generate_ephemeral_id(INSTALL + i * 60, &g).unwrap();
            a.store_contact(id, None, INSTALL + i * 60, g);
        }
        b.iter(|| a.find_crypto_matches(&feed).unwrap())
    });
}

criterion_group!(benches, benchmarks);
criterion_main!(benches);
