use std::env;
use std::io::{stdout, Write};

use objcmeta::container::{FatMachO, MachO};
use objcmeta::{Abi, AbiResult, Declaration};

fn main() -> AbiResult<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <file_path>", args[0]);
        return Ok(());
    }

    let bytes = std::fs::read(&args[1])
        .map_err(|e| objcmeta::AbiError::open(format!("failed to read {}: {e}", args[1])))?;

    let slice = if FatMachO::is_fat_magic(&bytes) {
        let fat = FatMachO::parse(&bytes)?;
        println!("This is a fat Mach-O file. Please select an architecture:");
        for (i, arch) in fat.archs.iter().enumerate() {
            println!("{i}: {:?} {:?}", arch.cputype(), arch.cpusubtype());
        }
        print!("> ");

        let index = loop {
            let mut input = String::new();
            stdout().flush().ok();
            std::io::stdin().read_line(&mut input).ok();
            match input.trim().parse::<usize>() {
                Ok(i) if i < fat.archs.len() => break i,
                _ => println!(
                    "Please enter a valid number between 0 and {}",
                    fat.archs.len() - 1
                ),
            }
        };
        fat.slice(fat.archs[index].cputype())?
    } else if MachO::is_macho_magic(&bytes) {
        &bytes
    } else {
        return Err(objcmeta::AbiError::open("not a Mach-O file".to_string()));
    };

    let abi = objcmeta::parse(slice)?;
    print_declarations(&abi);
    Ok(())
}

fn print_declarations(abi: &Abi) {
    for class in &abi.classes {
        println!("{}", class.declaration());
    }
    for category in &abi.categories {
        println!("{}", category.declaration());
    }
    for protocol in &abi.protocols {
        println!("{}", protocol.declaration());
    }
    if let Some(info) = abi.image_info {
        println!(
            "// image info: version={} swift={} arc_category_class_properties={}",
            info.version,
            info.swift_version(),
            info.has_category_class_properties()
        );
    }
}
