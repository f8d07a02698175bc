use std::io::{Cursor, Read};
use std::time::Duration;

use awsign_aws_v4::event_stream::{EventStreamSigner, Header, Message};
use awsign_aws_v4::{
    AwsChunked, ChecksumAlgorithm, ChunkedMode, Credential, RequestSigner, RequestSignerV4a,
};
use awsign_core::{Context, SignRequest};
use bytes::Bytes;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;
use criterion::Throughput;
use once_cell::sync::Lazy;

criterion_group!(benches, bench_sign, bench_chunked, bench_event_stream);
criterion_main!(benches);

static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("must success")
});

fn credential() -> Credential {
    Credential::new("access_key_id", "secret_access_key")
}

fn parts(uri: &str) -> http::request::Parts {
    http::Request::get(uri)
        .body(())
        .expect("request must be valid")
        .into_parts()
        .0
}

pub fn bench_sign(c: &mut Criterion) {
    let mut group = c.benchmark_group("aws_v4");
    let cred = credential();

    group.bench_function("header", |b| {
        let s = RequestSigner::new("s3", "test");
        let ctx = Context::new();

        b.to_async(&*RUNTIME).iter(|| async {
            let mut parts = parts("http://127.0.0.1:9000/hello?list-type=2&prefix=a%2Fb");
            s.sign_request(&ctx, &mut parts, Some(&cred), None)
                .await
                .expect("must success")
        })
    });

    group.bench_function("presign", |b| {
        let s = RequestSigner::new("s3", "test");

        b.iter(|| {
            let mut parts = parts("http://127.0.0.1:9000/hello");
            s.sign_with_output(&mut parts, Some(&cred), Some(Duration::from_secs(3600)))
                .expect("must success")
        })
    });

    group.bench_function("sigv4a", |b| {
        let s = RequestSignerV4a::new("s3", "*");

        b.iter(|| {
            let mut parts = parts("http://127.0.0.1:9000/hello");
            s.sign_with_output(&mut parts, Some(&cred), None)
                .expect("must success")
        })
    });

    group.finish();
}

pub fn bench_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("aws_chunked");
    let data = vec![0x5a; 1024 * 1024];
    group.throughput(Throughput::Bytes(data.len() as u64));

    let signer = RequestSigner::new("s3", "test");
    let cred = credential();
    for (name, mode) in [
        ("signed", ChunkedMode::SignedV4WithTrailer),
        ("unsigned", ChunkedMode::UnsignedWithTrailer),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut parts = http::Request::put("http://127.0.0.1:9000/hello")
                    .header(http::header::CONTENT_LENGTH, data.len())
                    .body(())
                    .expect("request must be valid")
                    .into_parts()
                    .0;
                let prepared = AwsChunked::new(mode)
                    .with_checksum(ChecksumAlgorithm::Crc32c)
                    .prepare(&mut parts)
                    .expect("must success");
                let rolling = if mode.is_signed() {
                    signer
                        .sign_with_output(&mut parts, Some(&cred), None)
                        .expect("must success")
                        .map(|v| v.rolling_signer())
                } else {
                    None
                };

                let mut out = Vec::with_capacity(prepared.encoded_length() as usize);
                prepared
                    .reader(Cursor::new(&data), rolling)
                    .expect("must success")
                    .read_to_end(&mut out)
                    .expect("must success");
                out
            })
        });
    }

    group.finish();
}

pub fn bench_event_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_stream");
    let message = Message::new(Bytes::from(vec![0u8; 4096]))
        .with_header(Header::new(":event-type", "AudioEvent"))
        .with_header(Header::new(":message-type", "event"));

    group.bench_function("sign", |b| {
        let mut signer = EventStreamSigner::new(credential(), "test", "transcribe", "seed");

        b.iter(|| signer.sign(&message).expect("must success"))
    });

    group.finish();
}
