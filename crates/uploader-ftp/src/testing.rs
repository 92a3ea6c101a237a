//! In-process FTP/FTPS server for tests, here and in crates using this
//! one (feature `test-util`).
//!
//! Speaks enough of RFC 959/4217 for login, listing, directory creation
//! and STOR. Secure servers use a fresh self-signed certificate, so the
//! client side needs `accept_invalid_certs`.

use crate::types::{FtpConnectionConfig, FtpSecurityMode};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

trait Io: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Io for T {}

type Stream = Box<dyn Io>;
type Control = BufReader<Stream>;

/// What LIST sends for a path that holds no file.
#[derive(Debug, Clone, Default)]
pub enum MissingListing {
    /// 150, an empty data connection, 226.
    #[default]
    Empty,
    /// 550 on the control channel.
    NotFound,
    /// 150, this text on the data connection, 226.
    Text(String),
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub files: HashMap<String, Vec<u8>>,
    pub dirs: HashSet<String>,
    /// Paths whose STOR is answered with 553.
    pub reject: HashSet<String>,
    /// Every command line received, in order.
    pub commands: Vec<String>,
    pub missing_listing: MissingListing,
    /// Answer LIST with 150, then never send data or a final reply.
    pub stall_listing: bool,
    /// Close the control connection instead of answering QUIT.
    pub hang_up_on_quit: bool,
    /// Data connections that ran over TLS.
    pub tls_data_connections: usize,
}

struct Shared {
    state: Arc<Mutex<ServerState>>,
    acceptor: Option<TlsAcceptor>,
    security: FtpSecurityMode,
    banner: String,
    password: String,
}

pub struct TestServer {
    pub port: u16,
    pub state: Arc<Mutex<ServerState>>,
    security: FtpSecurityMode,
    password: String,
}

impl TestServer {
    /// Plain FTP server accepting `password`.
    pub async fn start(password: &str) -> Self {
        Self::start_with(FtpSecurityMode::None, "220 test server ready", password).await
    }

    /// Explicit or implicit FTPS server accepting `password`.
    pub async fn start_secure(security: FtpSecurityMode, password: &str) -> Self {
        Self::start_with(security, "220 test server ready", password).await
    }

    /// Server greeting with `banner`; a non-2xx banner is followed by a
    /// hang-up.
    pub async fn start_with(security: FtpSecurityMode, banner: &str, password: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = Arc::new(Mutex::new(ServerState::default()));
        state.lock().unwrap().dirs.insert("/".into());

        let shared = Arc::new(Shared {
            state: state.clone(),
            acceptor: security.is_secure().then(self_signed_acceptor),
            security,
            banner: banner.to_string(),
            password: password.to_string(),
        });
        tokio::spawn(async move {
            while let Ok((sock, _)) = listener.accept().await {
                tokio::spawn(session(sock, shared.clone()));
            }
        });

        Self {
            port,
            state,
            security,
            password: password.to_string(),
        }
    }

    /// Client settings for this server, with short timeouts.
    pub fn config(&self) -> FtpConnectionConfig {
        FtpConnectionConfig {
            host: "127.0.0.1".into(),
            port: self.port,
            username: "tester".into(),
            password: self.password.clone(),
            security: self.security,
            accept_invalid_certs: true,
            connect_timeout_sec: 5,
            data_timeout_sec: 5,
            ..FtpConnectionConfig::default()
        }
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut ServerState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn put(&self, path: &str, data: &[u8]) {
        self.with_state(|s| s.files.insert(path.into(), data.to_vec()));
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.with_state(|s| s.files.get(path).cloned())
    }

    pub fn reject(&self, path: &str) {
        self.with_state(|s| s.reject.insert(path.into()));
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.with_state(|s| s.dirs.contains(path))
    }

    /// Whether a command starting with `prefix` was received.
    pub fn saw(&self, prefix: &str) -> bool {
        self.with_state(|s| s.commands.iter().any(|c| c.starts_with(prefix)))
    }
}

fn self_signed_acceptor() -> TlsAcceptor {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
            .expect("self-signed certificate");
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));
    let config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .expect("protocol versions")
    .with_no_client_auth()
    .with_single_cert(vec![cert.der().clone()], key)
    .expect("server certificate");
    TlsAcceptor::from(Arc::new(config))
}

async fn reply(ctrl: &mut Control, text: &str) {
    let w = ctrl.get_mut();
    let _ = w.write_all(format!("{}\r\n", text).as_bytes()).await;
    let _ = w.flush().await;
}

async fn accept_data(listener: TcpListener, tls: Option<&TlsAcceptor>) -> Option<Stream> {
    let (tcp, _) = listener.accept().await.ok()?;
    match tls {
        Some(acceptor) => Some(Box::new(acceptor.accept(tcp).await.ok()?) as Stream),
        None => Some(Box::new(tcp) as Stream),
    }
}

async fn session(tcp: TcpStream, shared: Arc<Shared>) {
    let stream: Stream = match (shared.security, &shared.acceptor) {
        (FtpSecurityMode::Implicit, Some(acceptor)) => match acceptor.accept(tcp).await {
            Ok(tls) => Box::new(tls) as Stream,
            Err(_) => return,
        },
        _ => Box::new(tcp) as Stream,
    };
    let mut ctrl: Control = BufReader::new(stream);
    let state = &shared.state;
    let mut pasv: Option<TcpListener> = None;
    let mut prot_p = false;
    let mut cwd = String::from("/");

    reply(&mut ctrl, &shared.banner).await;
    if !shared.banner.starts_with('2') {
        return;
    }

    loop {
        let mut line = String::new();
        match ctrl.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = line.trim_end().to_string();
        let (cmd, arg) = match line.split_once(' ') {
            Some((c, a)) => (c.to_ascii_uppercase(), a.to_string()),
            None => (line.to_ascii_uppercase(), String::new()),
        };
        state.lock().unwrap().commands.push(line.clone());
        let data_tls = if prot_p { shared.acceptor.as_ref() } else { None };

        match cmd.as_str() {
            "AUTH" => match &shared.acceptor {
                Some(acceptor) => {
                    reply(&mut ctrl, "234 Proceed with negotiation").await;
                    let plain = ctrl.into_inner();
                    ctrl = match acceptor.accept(plain).await {
                        Ok(tls) => BufReader::new(Box::new(tls) as Stream),
                        Err(_) => return,
                    };
                }
                None => reply(&mut ctrl, "502 TLS not available").await,
            },
            "PBSZ" => reply(&mut ctrl, "200 PBSZ=0").await,
            "PROT" => {
                prot_p = arg.eq_ignore_ascii_case("P");
                reply(&mut ctrl, "200 Protection level set").await;
            }
            "USER" => reply(&mut ctrl, "331 Password required").await,
            "PASS" if arg == shared.password => reply(&mut ctrl, "230 Logged in").await,
            "PASS" => reply(&mut ctrl, "530 Login incorrect").await,
            "FEAT" => {
                reply(
                    &mut ctrl,
                    "211-Features:\r\n AUTH TLS\r\n PBSZ\r\n PROT\r\n PASV\r\n SIZE\r\n UTF8\r\n211 End",
                )
                .await
            }
            "OPTS" | "TYPE" | "NOOP" => reply(&mut ctrl, "200 OK").await,
            "SYST" => reply(&mut ctrl, "215 UNIX Type: L8").await,
            "PWD" => reply(&mut ctrl, &format!("257 \"{}\" is the current directory", cwd)).await,
            "CWD" => {
                if state.lock().unwrap().dirs.contains(&arg) {
                    cwd = arg;
                    reply(&mut ctrl, "250 Directory changed").await;
                } else {
                    reply(&mut ctrl, "550 No such directory").await;
                }
            }
            "MKD" => {
                state.lock().unwrap().dirs.insert(arg.clone());
                reply(&mut ctrl, &format!("257 \"{}\" created", arg)).await;
            }
            "SIZE" => {
                let size = state.lock().unwrap().files.get(&arg).map(Vec::len);
                match size {
                    Some(n) => reply(&mut ctrl, &format!("213 {}", n)).await,
                    None => reply(&mut ctrl, "550 Could not get file size").await,
                }
            }
            "PASV" => {
                let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let p = l.local_addr().unwrap().port();
                pasv = Some(l);
                let text = format!("227 Entering Passive Mode (127,0,0,1,{},{})", p >> 8, p & 0xff);
                reply(&mut ctrl, &text).await;
            }
            "LIST" => {
                let Some(l) = pasv.take() else {
                    reply(&mut ctrl, "425 Use PASV first").await;
                    continue;
                };
                let (body, stall) = {
                    let st = state.lock().unwrap();
                    let body = match st.files.get(&arg) {
                        Some(data) => {
                            let name = arg.rsplit('/').next().unwrap_or(&arg);
                            Some(format!(
                                "-rw-r--r--    1 ftp      ftp      {:>8} Jan 01 12:00 {}\r\n",
                                data.len(),
                                name
                            ))
                        }
                        None => match &st.missing_listing {
                            MissingListing::Empty => Some(String::new()),
                            MissingListing::NotFound => None,
                            MissingListing::Text(t) => Some(format!("{}\r\n", t)),
                        },
                    };
                    (body, st.stall_listing)
                };
                let Some(body) = body else {
                    reply(&mut ctrl, "550 No such file or directory").await;
                    continue;
                };

                reply(&mut ctrl, "150 Here comes the listing").await;
                let Some(mut data) = accept_data(l, data_tls).await else {
                    reply(&mut ctrl, "425 Data connection failed").await;
                    continue;
                };
                if data_tls.is_some() {
                    state.lock().unwrap().tls_data_connections += 1;
                }
                if stall {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    break;
                }
                let _ = data.write_all(body.as_bytes()).await;
                let _ = data.shutdown().await;
                drop(data);
                reply(&mut ctrl, "226 Directory send OK").await;
            }
            "STOR" => {
                let Some(l) = pasv.take() else {
                    reply(&mut ctrl, "425 Use PASV first").await;
                    continue;
                };
                if state.lock().unwrap().reject.contains(&arg) {
                    reply(&mut ctrl, "553 Could not create file").await;
                    continue;
                }
                reply(&mut ctrl, "150 Ok to send data").await;
                let Some(mut data) = accept_data(l, data_tls).await else {
                    reply(&mut ctrl, "425 Data connection failed").await;
                    continue;
                };
                let mut buf = Vec::new();
                let _ = data.read_to_end(&mut buf).await;
                {
                    let mut st = state.lock().unwrap();
                    if data_tls.is_some() {
                        st.tls_data_connections += 1;
                    }
                    st.files.insert(arg, buf);
                }
                reply(&mut ctrl, "226 Transfer complete").await;
            }
            "QUIT" => {
                if !state.lock().unwrap().hang_up_on_quit {
                    reply(&mut ctrl, "221 Goodbye").await;
                }
                break;
            }
            _ => reply(&mut ctrl, "502 Command not implemented").await,
        }
    }
}
