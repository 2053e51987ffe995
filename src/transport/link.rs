use anyhow::{anyhow, Context, Result};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use url::Url;

/// Bounds on one input discard, so a peer that never pauses cannot stall a request.
const DISCARD_MAX_BYTES: usize = 1024 * 1024;
const DISCARD_MAX_TIME: Duration = Duration::from_millis(100);

/// A bidirectional byte stream to the camera.
///
/// Only one request may be in flight on a link; callers own it exclusively.
pub trait ByteLink: Send {
    /// Human-readable endpoint, for logs.
    fn describe(&self) -> String;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read whatever arrives within `wait`. `Ok(0)` means nothing arrived yet;
    /// a closed or vanished peer is reported as an error.
    fn read_available(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize>;

    /// Drop input that was received but not consumed (stale replies, boot noise).
    fn discard_input(&mut self) -> io::Result<()>;
}

/// Open the link named by a device identifier.
///
/// Accepted forms: `tcp://host:port`, `serial:///dev/ttyUSB0`, or a bare path.
pub fn open_link(device: &str, baud: u32) -> Result<Box<dyn ByteLink>> {
    match Url::parse(device) {
        Ok(url) if url.scheme() == "tcp" => Ok(Box::new(TcpLink::connect(&url)?)),
        Ok(url) if url.scheme() == "serial" => open_serial(url.path(), baud),
        Ok(url) => Err(anyhow!(
            "unsupported device scheme '{}'; expected tcp:// or serial://",
            url.scheme()
        )),
        // Bare paths are not URLs.
        Err(_) => open_serial(device, baud),
    }
}

#[cfg(target_os = "linux")]
fn open_serial(path: &str, baud: u32) -> Result<Box<dyn ByteLink>> {
    Ok(Box::new(SerialLink::open(path, baud)?))
}

#[cfg(not(target_os = "linux"))]
fn open_serial(path: &str, _baud: u32) -> Result<Box<dyn ByteLink>> {
    Err(anyhow!(
        "serial device {} unsupported on this platform; bridge it and use tcp://",
        path
    ))
}

/// Camera reachable through a TCP serial bridge (or the loopback simulator).
pub struct TcpLink {
    stream: TcpStream,
    peer: String,
}

impl TcpLink {
    pub fn connect(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("tcp device url missing host"))?;
        let port = url
            .port()
            .ok_or_else(|| anyhow!("tcp device url missing port"))?;
        let peer = format!("{}:{}", host, port);
        let stream =
            TcpStream::connect(&peer).with_context(|| format!("connect to camera at {}", peer))?;
        stream.set_nodelay(true).context("set TCP_NODELAY")?;
        Ok(Self { stream, peer })
    }
}

impl ByteLink for TcpLink {
    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    fn read_available(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        // A zero read timeout is rejected by the OS API.
        let wait = wait.max(Duration::from_millis(1));
        self.stream.set_read_timeout(Some(wait))?;
        match self.stream.read(buf) {
            Ok(0) => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "camera closed the connection",
            )),
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(0)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.stream.set_nonblocking(true)?;
        let mut scratch = [0u8; 4096];
        let deadline = Instant::now() + DISCARD_MAX_TIME;
        let mut discarded = 0usize;
        let result = loop {
            if discarded >= DISCARD_MAX_BYTES || Instant::now() >= deadline {
                log::debug!("stopped discarding after {} bytes", discarded);
                break Ok(());
            }
            match self.stream.read(&mut scratch) {
                Ok(0) => {
                    break Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "camera closed the connection",
                    ))
                }
                Ok(n) => discarded += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        result
    }
}

#[cfg(target_os = "linux")]
pub use serial::SerialLink;

#[cfg(target_os = "linux")]
mod serial {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    /// Camera on a local tty, configured raw 8N1 at the requested line rate.
    pub struct SerialLink {
        file: File,
        path: String,
        baud: u32,
    }

    impl SerialLink {
        pub fn open(path: &str, baud: u32) -> Result<Self> {
            let speed = baud_constant(baud)?;
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(libc::O_NOCTTY)
                .open(path)
                .with_context(|| format!("open serial device {}", path))?;
            configure_raw(&file, speed)
                .with_context(|| format!("configure {} at {} baud", path, baud))?;
            Ok(Self {
                file,
                path: path.to_string(),
                baud,
            })
        }
    }

    impl ByteLink for SerialLink {
        fn describe(&self) -> String {
            format!("{}@{}", self.path, self.baud)
        }

        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.file.write_all(bytes)?;
            self.file.flush()
        }

        fn read_available(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
            let mut pfd = libc::pollfd {
                fd: self.file.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let timeout_ms = wait.as_millis().min(i32::MAX as u128) as libc::c_int;
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    return Ok(0);
                }
                return Err(err);
            }
            if rc == 0 {
                return Ok(0);
            }
            if pfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0 {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    format!("serial device {} hung up", self.path),
                ));
            }
            match self.file.read(buf) {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
                Err(e) => Err(e),
            }
        }

        fn discard_input(&mut self) -> io::Result<()> {
            let rc = unsafe { libc::tcflush(self.file.as_raw_fd(), libc::TCIFLUSH) };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }

    fn configure_raw(file: &File, speed: libc::speed_t) -> io::Result<()> {
        let fd = file.as_raw_fd();
        let mut tio: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
            return Err(io::Error::last_os_error());
        }
        unsafe { libc::cfmakeraw(&mut tio) };
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cc[libc::VMIN] = 0;
        tio.c_cc[libc::VTIME] = 0;
        if unsafe { libc::cfsetispeed(&mut tio, speed) } != 0
            || unsafe { libc::cfsetospeed(&mut tio, speed) } != 0
        {
            return Err(io::Error::last_os_error());
        }
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn baud_constant(baud: u32) -> Result<libc::speed_t> {
        let speed = match baud {
            9_600 => libc::B9600,
            19_200 => libc::B19200,
            38_400 => libc::B38400,
            57_600 => libc::B57600,
            115_200 => libc::B115200,
            230_400 => libc::B230400,
            460_800 => libc::B460800,
            500_000 => libc::B500000,
            921_600 => libc::B921600,
            1_000_000 => libc::B1000000,
            1_500_000 => libc::B1500000,
            2_000_000 => libc::B2000000,
            other => return Err(anyhow!("unsupported serial line rate {}", other)),
        };
        Ok(speed)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn common_line_rates_map_to_termios_constants() {
            assert_eq!(baud_constant(921_600).unwrap(), libc::B921600);
            assert_eq!(baud_constant(115_200).unwrap(), libc::B115200);
            assert!(baud_constant(12_345).is_err());
        }

        #[test]
        fn missing_device_is_an_open_error() {
            let err = SerialLink::open("/dev/does-not-exist-dotsync", 921_600)
                .err()
                .expect("open should fail");
            assert!(format!("{:#}", err).contains("/dev/does-not-exist-dotsync"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_schemes() {
        let err = open_link("http://camera.local/stream", 921_600)
            .err()
            .expect("http is not a byte link");
        assert!(err.to_string().contains("unsupported device scheme"));
    }

    #[test]
    fn discard_returns_against_a_peer_that_never_pauses() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let writer = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let junk = [0x55u8; 8192];
            while stream.write_all(&junk).is_ok() {}
        });

        let url = Url::parse(&format!("tcp://{}", addr)).unwrap();
        let mut link = TcpLink::connect(&url).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        link.discard_input().unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));

        drop(link);
        writer.join().unwrap();
    }

    #[test]
    fn tcp_url_requires_port() {
        let err = open_link("tcp://127.0.0.1", 921_600)
            .err()
            .expect("port is mandatory");
        assert!(err.to_string().contains("missing port"));
    }
}
