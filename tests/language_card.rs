use a2core::apple2::{Apple2, Model};
use a2core::config::Config;

fn machine(model: Model) -> Apple2 {
    let size = if model.is_iie() { 0x4000 } else { 0x3000 };
    let mut rom = vec![0x60; size];
    // リセットベクタ → $FF00 (RTS の並び)
    rom[size - 4] = 0x00;
    rom[size - 3] = 0xFF;
    let config = Config {
        model,
        ..Default::default()
    };
    Apple2::new(&config, &rom)
}

const MODELS: [Model; 3] = [Model::AppleIIPlus, Model::AppleIIe, Model::AppleIIeEnhanced];

#[test]
fn read_read_write_is_visible() {
    for model in MODELS {
        let m = machine(model);
        m.peek(0xC08B);
        m.peek(0xC08B);
        m.poke(0xD000, 0x42);
        assert_eq!(m.peek(0xD000), 0x42, "{}", model);
    }
}

#[test]
fn read_then_write_switch_does_not_enable() {
    for model in MODELS {
        let m = machine(model);
        m.peek(0xC08B);
        m.poke(0xC08B, 0x00);
        m.poke(0xD000, 0x42);
        assert_eq!(m.peek(0xD000), 0x00, "{}", model);
    }
}

#[test]
fn repeated_reassertion_keeps_write_enabled() {
    for model in MODELS {
        let m = machine(model);
        for _ in 0..4 {
            m.peek(0xC083);
        }
        m.poke(0xE000, 0x11);
        m.poke(0xC083, 0x00);
        m.poke(0xE001, 0x22);
        assert_eq!(m.peek(0xE000), 0x11, "{}", model);
        assert_eq!(m.peek(0xE001), 0x22, "{}", model);
    }
}

#[test]
fn rom_visible_until_ram_read_selected() {
    for model in MODELS {
        let m = machine(model);
        // ROM読み取り + RAM書き込み
        m.peek(0xC081);
        m.peek(0xC081);
        m.poke(0xF800, 0x99);
        assert_eq!(m.peek(0xF800), 0x60, "{}", model);
        // RAM読み取り
        m.peek(0xC080);
        assert_eq!(m.peek(0xF800), 0x99, "{}", model);
    }
}

#[test]
fn reset_returns_to_rom() {
    for model in MODELS {
        let mut m = machine(model);
        m.peek(0xC08B);
        m.peek(0xC08B);
        m.poke(0xD000, 0x42);
        m.reset();
        assert_eq!(m.peek(0xD000), 0x60, "{}", model);
        assert_eq!(m.cpu.regs.pc, 0xFF00);
    }
}
