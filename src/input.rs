//! 入力ポートとDIPスイッチ
//!
//! ドライバはポートごとに既定値・論理（アクティブロー）・DIPスイッチを宣言する。
//! CPUからは `read_port(n)` で読み取る

use std::collections::BTreeMap;

bitflags::bitflags! {
    /// 入力ポートのビット（一般的な配置）
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PortBits: u8 {
        const BIT0 = 0b0000_0001;
        const BIT1 = 0b0000_0010;
        const BIT2 = 0b0000_0100;
        const BIT3 = 0b0000_1000;
        const BIT4 = 0b0001_0000;
        const BIT5 = 0b0010_0000;
        const BIT6 = 0b0100_0000;
        const BIT7 = 0b1000_0000;
    }
}

/// DIPスイッチの選択肢
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DipChoice {
    pub label: &'static str,
    pub value: u8,
}

/// DIPスイッチ（ポート内の複数ビット）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DipSwitch {
    pub name: &'static str,
    pub mask: u8,
    pub default: u8,
    pub choices: &'static [DipChoice],
}

/// 入力ポートの宣言
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPortDef {
    pub name: &'static str,
    /// ボタン非押下時の値
    pub default: u8,
    /// 押下でビットが0になる
    pub active_low: bool,
    pub dips: &'static [DipSwitch],
}

/// ホスト側の論理ボタン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Button {
    Coin1,
    Coin2,
    Start1,
    Start2,
    Up,
    Down,
    Left,
    Right,
    Button1,
    Button2,
    Service,
}

/// ボタンとポートビットの対応
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonBinding {
    pub button: Button,
    pub port: usize,
    pub bits: PortBits,
}

/// 入力ポートの現在状態
#[derive(Debug, Clone)]
pub struct InputPorts {
    defs: Vec<InputPortDef>,
    bindings: Vec<ButtonBinding>,
    /// DIPスイッチ設定値（ポートごと、マスク済み）
    dip_values: Vec<u8>,
    /// 押下中ビット（ポートごと）
    pressed: Vec<u8>,
}

impl InputPorts {
    pub fn new(defs: &[InputPortDef], bindings: &[ButtonBinding]) -> Self {
        let dip_values = defs
            .iter()
            .map(|d| d.dips.iter().fold(0u8, |acc, dip| acc | (dip.default & dip.mask)))
            .collect();
        InputPorts {
            defs: defs.to_vec(),
            bindings: bindings.to_vec(),
            dip_values,
            pressed: vec![0; defs.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn defs(&self) -> &[InputPortDef] {
        &self.defs
    }

    /// ポートnを読み取る（未定義ポートは0xFF）
    pub fn read_port(&self, n: usize) -> u8 {
        let Some(def) = self.defs.get(n) else {
            return 0xFF;
        };
        let dip_mask = def.dips.iter().fold(0u8, |acc, d| acc | d.mask);
        let mut value = (def.default & !dip_mask) | self.dip_values[n];
        if def.active_low {
            value &= !self.pressed[n];
        } else {
            value |= self.pressed[n];
        }
        value
    }

    pub fn press_bits(&mut self, port: usize, bits: PortBits, down: bool) {
        if let Some(p) = self.pressed.get_mut(port) {
            if down {
                *p |= bits.bits();
            } else {
                *p &= !bits.bits();
            }
        }
    }

    /// 論理ボタンの押下状態を反映
    pub fn set_button(&mut self, button: Button, down: bool) {
        let targets: Vec<(usize, PortBits)> = self
            .bindings
            .iter()
            .filter(|b| b.button == button)
            .map(|b| (b.port, b.bits))
            .collect();
        for (port, bits) in targets {
            self.press_bits(port, bits, down);
        }
    }

    pub fn release_all(&mut self) {
        self.pressed.iter_mut().for_each(|p| *p = 0);
    }

    /// DIPスイッチを名前で設定する
    pub fn set_dip(&mut self, name: &str, value: u8) -> bool {
        for (n, def) in self.defs.iter().enumerate() {
            if let Some(dip) = def.dips.iter().find(|d| d.name == name) {
                self.dip_values[n] = (self.dip_values[n] & !dip.mask) | (value & dip.mask);
                return true;
            }
        }
        false
    }

    /// 設定ファイルのDIP上書きを適用
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, u8>) {
        for (name, value) in overrides {
            if !self.set_dip(name, *value) {
                log::warn!("Unknown DIP switch: {}", name);
            }
        }
    }

    pub fn dip_values(&self) -> &[u8] {
        &self.dip_values
    }

    pub fn restore_dip_values(&mut self, values: &[u8]) {
        for (dst, src) in self.dip_values.iter_mut().zip(values) {
            *dst = *src;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static LIVES: [DipChoice; 2] = [DipChoice { label: "3", value: 0x00 }, DipChoice { label: "5", value: 0x01 }];
    static DSW: [DipSwitch; 1] = [DipSwitch { name: "Lives", mask: 0x01, default: 0x00, choices: &LIVES }];

    fn ports() -> InputPorts {
        InputPorts::new(
            &[
                InputPortDef { name: "IN0", default: 0xFF, active_low: true, dips: &[] },
                InputPortDef { name: "DSW", default: 0x00, active_low: false, dips: &DSW },
            ],
            &[ButtonBinding { button: Button::Coin1, port: 0, bits: PortBits::BIT0 }],
        )
    }

    #[test]
    fn test_active_low_buttons() {
        let mut ports = ports();
        assert_eq!(ports.read_port(0), 0xFF);
        ports.set_button(Button::Coin1, true);
        assert_eq!(ports.read_port(0), 0xFE);
        ports.set_button(Button::Coin1, false);
        assert_eq!(ports.read_port(0), 0xFF);
    }

    #[test]
    fn test_dip_override() {
        let mut ports = ports();
        assert_eq!(ports.read_port(1), 0x00);
        let mut overrides = BTreeMap::new();
        overrides.insert("Lives".to_string(), 0x01);
        ports.apply_overrides(&overrides);
        assert_eq!(ports.read_port(1), 0x01);
        assert!(!ports.set_dip("Bonus", 1));
    }

    #[test]
    fn test_undefined_port() {
        assert_eq!(ports().read_port(9), 0xFF);
    }
}
