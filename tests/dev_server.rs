use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use sitepipe::config::model::ServerSection;
use sitepipe::engine::Reloader;
use sitepipe::serve::{DevServer, ReloadBroadcaster};
use sitepipe::types::{ArtifactKind, BuildResult};
use sitepipe_test_utils::init_tracing;
use sitepipe_test_utils::project::TempProject;

fn local_server() -> ServerSection {
    ServerSection {
        host: "127.0.0.1".to_string(),
        port: 0,
        reload_port: 0,
        ..ServerSection::default()
    }
}

fn output_tree() -> TempProject {
    let project = TempProject::new();
    let out = project.output();
    std::fs::create_dir_all(out.join("css")).unwrap();
    std::fs::write(out.join("index.html"), "<html><body>home</body></html>").unwrap();
    std::fs::write(out.join("css/main.min.css"), "body{color:red}").unwrap();
    project
}

fn http(addr: std::net::SocketAddr, method: &str, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    write!(
        stream,
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    )
    .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).unwrap();
    response
}

#[test]
fn serves_output_files_with_reload_script() {
    init_tracing();
    let project = output_tree();
    let server = DevServer::start(&project.output(), &local_server()).unwrap();
    let reload_port = server.reloader().port();

    let page = http(server.addr(), "GET", "/");
    assert!(page.starts_with("HTTP/1.1 200"), "{page}");
    assert!(page.contains("text/html"), "{page}");
    assert!(page.contains("home"));
    assert!(page.contains(&format!(":{reload_port}")), "{page}");

    let css = http(server.addr(), "GET", "/css/main.min.css");
    assert!(css.starts_with("HTTP/1.1 200"), "{css}");
    assert!(css.contains("X-SourceMap: /maps/main.min.css.map"), "{css}");
    assert!(!css.contains("<script>"));

    let head = http(server.addr(), "HEAD", "/index.html");
    assert!(head.starts_with("HTTP/1.1 200"), "{head}");
    assert!(!head.contains("home"));

    assert!(http(server.addr(), "GET", "/missing.html").starts_with("HTTP/1.1 404"));
    assert!(http(server.addr(), "GET", "/../Sitepipe.toml").starts_with("HTTP/1.1 404"));
    assert!(http(server.addr(), "POST", "/").starts_with("HTTP/1.1 405"));

    server.shutdown();
}

#[test]
fn connected_browsers_receive_reload_messages() {
    init_tracing();
    let project = output_tree();
    let server = DevServer::start(&project.output(), &local_server()).unwrap();
    let reloader = server.reloader();

    let (mut client, _) =
        tungstenite::connect(format!("ws://127.0.0.1:{}", reloader.port())).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while reloader.client_count() == 0 {
        assert!(Instant::now() < deadline, "client never registered");
        thread::sleep(Duration::from_millis(20));
    }

    let mut result = BuildResult::succeeded("styles", ArtifactKind::Style);
    result.artifact_paths = vec![PathBuf::from("css/main.min.css")];
    reloader.notify_reload(&result);

    let message = client.read().unwrap();
    let value: serde_json::Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
    assert_eq!(value["type"], "css");
    assert_eq!(value["paths"][0], "/css/main.min.css");

    // Nothing written, nothing sent: the next message is the error.
    reloader.notify_reload(&BuildResult::succeeded("html", ArtifactKind::Markup));
    reloader.notify_error(
        "html",
        &sitepipe::errors::ErrorDetail::panic("template exploded"),
    );
    let message = client.read().unwrap();
    let value: serde_json::Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["task"], "html");
    assert_eq!(value["message"], "template exploded");

    server.shutdown();
    assert_eq!(reloader.client_count(), 0);
}

#[test]
fn silent_reload_connection_does_not_hold_up_shutdown() {
    init_tracing();
    let reloader = ReloadBroadcaster::bind("127.0.0.1", 0).unwrap();
    let _silent = TcpStream::connect(("127.0.0.1", reloader.port())).unwrap();
    thread::sleep(Duration::from_millis(300));

    let (done_tx, done_rx) = mpsc::channel();
    let stopping = Arc::clone(&reloader);
    thread::spawn(move || {
        stopping.shutdown();
        let _ = done_tx.send(());
    });

    assert!(
        done_rx.recv_timeout(Duration::from_secs(1)).is_ok(),
        "shutdown waited on an idle handshake"
    );
    assert_eq!(reloader.client_count(), 0);
}
