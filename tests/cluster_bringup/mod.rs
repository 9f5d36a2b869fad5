
pub const BRINGUP_PORT_BASE: u16 = 40000;
pub const RESTART_PORT_BASE: u16 = 42000;
