pub mod client;
pub mod probe;
pub mod resolver;
pub mod trace;

pub use probe::HttpTraceProber;

#[cfg(test)]
pub mod testing {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::hash::MessageDigest;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::{X509, X509NameBuilder};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_native_tls::TlsAcceptor;

    const OK_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok";

    /// Keep-alive HTTP/1.1 server answering `200 ok` to every request.
    pub struct TestServer {
        pub addr: SocketAddr,
        connections: Arc<AtomicUsize>,
    }

    impl TestServer {
        /// Number of accepted connections so far.
        pub fn connections(&self) -> usize {
            self.connections.load(Ordering::SeqCst)
        }
    }

    /// The first `drop_first` connections are closed after the request head
    /// has been read, without a response.
    pub async fn spawn_server(drop_first: usize) -> TestServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = connections.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(async move {
                    if n <= drop_first {
                        read_head(&mut stream).await;
                        return;
                    }
                    serve_ok(&mut stream).await;
                });
            }
        });

        TestServer { addr, connections }
    }

    /// HTTPS variant of [`spawn_server`] presenting a fresh self-signed
    /// certificate for `localhost`.
    pub async fn spawn_tls_server() -> SocketAddr {
        let identity = self_signed_identity();
        let acceptor = TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let acceptor = acceptor.clone();
                tokio::spawn(async move {
                    // a client that rejects the certificate aborts here
                    if let Ok(mut stream) = acceptor.accept(stream).await {
                        serve_ok(&mut stream).await;
                    }
                });
            }
        });

        addr
    }

    /// Accepts connections and holds them open without ever writing a byte.
    pub async fn spawn_silent_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        addr
    }

    fn self_signed_identity() -> native_tls::Identity {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "localhost").unwrap();
        let name = name.build();

        let mut cert = X509::builder().unwrap();
        cert.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        cert.set_serial_number(&serial).unwrap();
        cert.set_subject_name(&name).unwrap();
        cert.set_issuer_name(&name).unwrap();
        cert.set_pubkey(&key).unwrap();
        cert.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        cert.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        cert.sign(&key, MessageDigest::sha256()).unwrap();
        let cert = cert.build();

        native_tls::Identity::from_pkcs8(&cert.to_pem().unwrap(), &key.private_key_to_pem_pkcs8().unwrap()).unwrap()
    }

    async fn serve_ok<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S) {
        while read_head(stream).await {
            if stream.write_all(OK_RESPONSE).await.is_err() {
                return;
            }
        }
    }

    async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> bool {
        let mut head = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return false,
                Ok(n) => {
                    head.extend_from_slice(&chunk[..n]);
                    if head.windows(4).any(|w| w == b"\r\n\r\n") {
                        return true;
                    }
                }
            }
        }
    }
}
