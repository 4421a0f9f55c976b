use modbus_client::{
    retry_delay_ms, ClientConfig, ClientError, ModbusClient, Parity, RegisterReader,
};

#[tokio::test]
async fn serial_integration_read() {
    let port = match std::env::var("MODBUS_TEST_PORT") {
        Ok(value) => value,
        Err(_) => return,
    };

    let unit_id = env_u16("MODBUS_TEST_UNIT_ID").unwrap_or(1) as u8;
    let start = env_u16("MODBUS_TEST_START").unwrap_or(0);
    let count = env_u16("MODBUS_TEST_COUNT").unwrap_or(8);

    let mut config = ClientConfig::default();
    config.port = port;
    config.baud_rate = env_u32("MODBUS_TEST_BAUD").unwrap_or(9_600);
    config.timeout_ms = env_u64("MODBUS_TEST_TIMEOUT_MS").unwrap_or(1_000);
    config.retry_count = env_usize("MODBUS_TEST_RETRY_COUNT").unwrap_or(1);

    let client = ModbusClient::connect(config).await.expect("connect");
    let values = client
        .read_input_registers(unit_id, start, count)
        .await
        .expect("read");

    assert_eq!(values.len() as u16, count);
}

#[tokio::test]
async fn missing_serial_port_fails_to_open() {
    let mut config = ClientConfig::default();
    config.port = "/dev/this-port-does-not-exist".to_string();

    let err = ModbusClient::connect(config).await.expect_err("open must fail");
    assert!(matches!(err, ClientError::Serial { .. }));
}

#[test]
fn default_link_is_9600_8n1() {
    let config = ClientConfig::default();
    assert_eq!(config.baud_rate, 9_600);
    assert_eq!(config.data_bits, 8);
    assert_eq!(config.parity, Parity::None);
    assert_eq!(config.stop_bits, 1);
    assert_eq!(config.timeout_ms, 1_000);
    assert_eq!(config.retry_count, 0);
}

#[test]
fn parity_parses_short_and_long_forms() {
    assert_eq!("N".parse::<Parity>().expect("parse"), Parity::None);
    assert_eq!("even".parse::<Parity>().expect("parse"), Parity::Even);
    assert_eq!(" Odd ".parse::<Parity>().expect("parse"), Parity::Odd);
    assert!(matches!(
        "mark".parse::<Parity>(),
        Err(ClientError::InvalidParity(_))
    ));
    assert_eq!(Parity::Even.to_string(), "E");
}

#[test]
fn retry_backoff_doubles_and_caps() {
    assert_eq!(retry_delay_ms(100, 2_000, 0), 100);
    assert_eq!(retry_delay_ms(100, 2_000, 1), 200);
    assert_eq!(retry_delay_ms(100, 2_000, 3), 800);
    assert_eq!(retry_delay_ms(100, 2_000, 10), 2_000);
    assert_eq!(retry_delay_ms(100, 2_000, 200), 2_000);
}

fn env_u16(key: &str) -> Option<u16> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}
